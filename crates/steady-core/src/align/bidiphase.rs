//! Line-scan phase offset between alternating rows.
//!
//! Bidirectional scanning writes odd rows in the opposite direction, which
//! leaves them horizontally offset from the even rows. The offset is found
//! by cross-correlating each odd row with the even row above it. Rows are
//! mean-subtracted and Hann-windowed so the wrap-around edge of the
//! transform does not pull the peak towards lag 0.

use ndarray::{ArrayView1, ArrayView2, ArrayView3, ArrayViewMut2, Axis};
use num_complex::Complex32;
use rustfft::FftPlanner;

use crate::consts::BIDIPHASE_MAX_SHIFT;

use super::subpixel::parabolic_offset;

fn hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (1.0 - (std::f32::consts::TAU * i as f32 / len as f32).cos()))
        .collect()
}

fn load_row(dst: &mut [Complex32], row: ArrayView1<f32>, window: &[f32]) {
    let mean = row.mean().unwrap_or(0.0);
    for ((d, &v), &w) in dst.iter_mut().zip(row.iter()).zip(window) {
        *d = Complex32::new((v - mean) * w, 0.0);
    }
}

/// Estimate the odd-row correction (in pixels) over a stack of frames.
///
/// Cross-power spectra are summed over every row pair of every frame before
/// the single inverse transform. Apply the result with [`apply_bidiphase`].
/// Returns 0 for stacks too small to measure.
pub fn estimate_bidiphase(frames: &ArrayView3<f32>) -> f32 {
    let (nframes, ly, lx) = frames.dim();
    let pairs = ly / 2;
    if nframes == 0 || pairs == 0 || lx < 4 {
        return 0.0;
    }

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(lx);
    let inverse = planner.plan_fft_inverse(lx);
    let window = hann(lx);

    let mut acc = vec![Complex32::default(); lx];
    let mut even = vec![Complex32::default(); lx];
    let mut odd = vec![Complex32::default(); lx];
    for frame in frames.axis_iter(Axis(0)) {
        for p in 0..pairs {
            load_row(&mut even, frame.row(2 * p), &window);
            load_row(&mut odd, frame.row(2 * p + 1), &window);
            forward.process(&mut even);
            forward.process(&mut odd);
            for ((a, o), e) in acc.iter_mut().zip(&odd).zip(&even) {
                *a += *o * e.conj();
            }
        }
    }
    inverse.process(&mut acc);

    // Peak at lag s means odd(x) ~ even(x - s).
    let corr = |lag: isize| -> f32 { acc[lag.rem_euclid(lx as isize) as usize].re };
    let limit = BIDIPHASE_MAX_SHIFT.min(lx / 2 - 1) as isize;
    let mut best_lag = 0isize;
    let mut best = f32::NEG_INFINITY;
    for lag in -limit..=limit {
        let v = corr(lag);
        if v > best {
            best = v;
            best_lag = lag;
        }
    }
    // Flat rows carry no offset information.
    if best <= 0.0 {
        return 0.0;
    }
    let lag = best_lag as f32 + parabolic_offset(corr(best_lag - 1), best, corr(best_lag + 1));

    -lag
}

/// Estimate the odd-row correction from a single image.
pub fn estimate_bidiphase_image(image: &ArrayView2<f32>) -> f32 {
    estimate_bidiphase(&image.view().insert_axis(Axis(0)))
}

/// Shift every odd row horizontally by `bidiphase` pixels:
/// `odd'(x) = odd(x - bidiphase)`, linearly interpolated with edge clamping.
pub fn apply_bidiphase(frame: &mut ArrayViewMut2<f32>, bidiphase: f32) {
    if bidiphase == 0.0 {
        return;
    }
    let lx = frame.ncols();
    if lx == 0 {
        return;
    }
    let last = (lx - 1) as f32;
    let mut original = vec![0.0f32; lx];
    for mut row in frame.axis_iter_mut(Axis(0)).skip(1).step_by(2) {
        for (dst, &v) in original.iter_mut().zip(row.iter()) {
            *dst = v;
        }
        for (x, out) in row.iter_mut().enumerate() {
            let src = (x as f32 - bidiphase).clamp(0.0, last);
            let x0 = src.floor() as usize;
            let x1 = (x0 + 1).min(lx - 1);
            let t = src - x0 as f32;
            *out = original[x0] + t * (original[x1] - original[x0]);
        }
    }
}
