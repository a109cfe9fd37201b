mod common;

use ndarray::{Array2, Axis};

use steady_core::align::masks::{prepare_masks, rigid_search_radius, spatial_taper};
use steady_core::align::phase_correlation::estimate_rigid;
use steady_core::align::register_frame;
use steady_core::align::warp::shift_frame;
use steady_core::pipeline::config::RegistrationConfig;

use common::BlobScene;

fn config(ly: usize, lx: usize) -> RegistrationConfig {
    RegistrationConfig {
        ly,
        lx,
        nonrigid: false,
        ..RegistrationConfig::default()
    }
}

fn roll(frame: &Array2<f32>, dy: isize, dx: isize) -> Array2<f32> {
    let (h, w) = frame.dim();
    Array2::from_shape_fn((h, w), |(r, c)| {
        let sr = (r as isize - dy).rem_euclid(h as isize) as usize;
        let sc = (c as isize - dx).rem_euclid(w as isize) as usize;
        frame[[sr, sc]]
    })
}

#[test]
fn test_reference_against_itself_is_zero() {
    let scene = BlobScene::new(64, 64, 1);
    let reference = scene.render(64, 64, 0.0, 0.0);
    let masks = prepare_masks(&reference, 0.0, &config(64, 64), None).unwrap();

    let same = estimate_rigid(&masks, &reference.view());
    assert!(same.dy.abs() < 0.05, "dy={}", same.dy);
    assert!(same.dx.abs() < 0.05, "dx={}", same.dx);

    // Any displaced copy correlates less than the reference itself.
    let moved = scene.render(64, 64, 1.0, -2.0);
    let other = estimate_rigid(&masks, &moved.view());
    assert!(same.corr > other.corr, "{} vs {}", same.corr, other.corr);
}

#[test]
fn test_rolled_reference_recovers_shift() {
    let scene = BlobScene::new(64, 64, 2);
    let reference = scene.render(64, 64, 0.0, 0.0);
    let masks = prepare_masks(&reference, 0.0, &config(64, 64), None).unwrap();

    for &(dy, dx) in &[(3isize, 0isize), (0, -4), (-2, 5), (6, -6)] {
        // Content displaced by (dy, dx) needs the correction (-dy, -dx).
        let frame = roll(&reference, dy, dx);
        let shift = estimate_rigid(&masks, &frame.view());
        assert!(
            (shift.dy + dy as f32).abs() < 0.25 && (shift.dx + dx as f32).abs() < 0.25,
            "content ({}, {}) gave correction ({}, {})",
            dy,
            dx,
            shift.dy,
            shift.dx
        );
    }
}

#[test]
fn test_subpixel_shift_within_tolerance() {
    let scene = BlobScene::new(96, 96, 3);
    let reference = scene.render(96, 96, 0.0, 0.0);
    let masks = prepare_masks(&reference, 0.0, &config(96, 96), None).unwrap();

    let frame = scene.render(96, 96, 1.5, -2.3);
    let shift = estimate_rigid(&masks, &frame.view());
    assert!((shift.dy + 1.5).abs() < 0.3, "dy={}", shift.dy);
    assert!((shift.dx - 2.3).abs() < 0.3, "dx={}", shift.dx);
}

#[test]
fn test_shift_beyond_search_window_is_clamped() {
    let scene = BlobScene::new(64, 64, 4);
    let reference = scene.render(64, 64, 0.0, 0.0);
    let cfg = RegistrationConfig {
        maxregshift: 0.05,
        ..config(64, 64)
    };
    let radius = rigid_search_radius(64, 64, cfg.maxregshift) as f32;
    assert_eq!(radius, 3.0);
    let masks = prepare_masks(&reference, 0.0, &cfg, None).unwrap();

    let frame = roll(&reference, 10, 0);
    let shift = estimate_rigid(&masks, &frame.view());
    assert!(shift.dy.abs() <= radius + 0.5);
}

#[test]
fn test_register_frame_aligns_content() {
    let scene = BlobScene::new(64, 64, 5);
    let reference = scene.render(64, 64, 0.0, 0.0);
    let masks = prepare_masks(&reference, 0.0, &config(64, 64), None).unwrap();

    let frame = scene.render(64, 64, -2.0, 3.0);
    let result = register_frame(&masks, frame, false);
    assert!(result.blocks.is_none());
    assert!((result.rigid.dy - 2.0).abs() < 0.25);
    assert!((result.rigid.dx + 3.0).abs() < 0.25);

    let inner = |a: &Array2<f32>| a.slice(ndarray::s![4..60, 4..60]).to_owned();
    let diff = (&inner(&result.corrected) - &inner(&reference)).mapv(f32::abs);
    let range = reference.iter().copied().fold(0.0f32, f32::max);
    assert!(
        diff.mean().unwrap() < 0.01 * range,
        "mean residual {} of range {}",
        diff.mean().unwrap(),
        range
    );
}

#[test]
fn test_taper_is_flat_inside_and_low_at_edges() {
    let mask = spatial_taper(3.45, 64, 64);
    assert!(mask[[32, 32]] > 0.99);
    assert!(mask[[0, 32]] < 0.2);
    assert!(mask[[32, 63]] < 0.2);
    let row = mask.index_axis(Axis(0), 32);
    assert!((row[10] - row[53]).abs() < 1e-5, "taper is symmetric");
}

#[test]
fn test_shift_frame_round_trip() {
    let scene = BlobScene::new(48, 48, 6);
    let frame = scene.render(48, 48, 0.0, 0.0);
    let there = shift_frame(&frame.view(), 2.0, -3.0);
    let back = shift_frame(&there.view(), -2.0, 3.0);
    let inner = |a: &Array2<f32>| a.slice(ndarray::s![4..44, 4..44]).to_owned();
    assert_eq!(inner(&back), inner(&frame));
}
