mod common;

use ndarray::Axis;

use steady_core::align::masks::prepare_masks;
use steady_core::io::binary::{BinaryMovie, FrameStream};
use steady_core::pipeline::engine::RegistrationEngine;
use steady_core::pipeline::replicate::ShiftReplicator;

use common::{cyclic_shift, quantize, read_movie, rigid_movie, session_config, write_movie, BlobScene};

const LY: usize = 48;
const LX: usize = 48;
const NFRAMES: usize = 23;

fn setup(dir: &std::path::Path, name: &str, scene: &BlobScene) -> FrameStream {
    let path = dir.join(name);
    write_movie(&path, &rigid_movie(scene, NFRAMES, LY, LX));
    FrameStream::in_place(BinaryMovie::open_mut(&path, LY, LX, NFRAMES).unwrap())
}

#[test]
fn test_batches_cover_every_frame_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let scene = BlobScene::new(LY, LX, 41);
    let config = session_config(dir.path(), LY, LX);
    let reference = quantize(&scene.render(LY, LX, 0.0, 0.0));
    let masks = prepare_masks(&reference, 0.0, &config, None).unwrap();

    let mut stream = setup(dir.path(), "data.bin", &scene);
    let mut seen = Vec::new();
    let result = RegistrationEngine::new(&masks, &mut stream, NFRAMES, 7, false)
        .unwrap()
        .run(|batch| {
            assert_eq!(batch.nframes, NFRAMES);
            assert_eq!(batch.corrected.len_of(Axis(0)), batch.frames_done - seen.last().map(|&(_, d)| d).unwrap_or(0));
            seen.push((batch.batch_index, batch.frames_done));
            Ok(())
        })
        .unwrap();

    // ceil(23 / 7) = 4 batches
    assert_eq!(seen, vec![(0, 7), (1, 14), (2, 21), (3, 23)]);
    assert_eq!(result.nframes, NFRAMES);
    assert_eq!(result.offsets.len(), NFRAMES);
    assert!(!result.offsets.is_nonrigid());

    for t in 0..NFRAMES {
        let (dy, dx) = cyclic_shift(t);
        let shift = result.offsets.rigid(t);
        assert!((shift.dy + dy).abs() < 0.3, "frame {} dy {}", t, shift.dy);
        assert!((shift.dx + dx).abs() < 0.3, "frame {} dx {}", t, shift.dx);
    }

    let mean = result.mean_image();
    let expected = &result.sum_image / NFRAMES as f32;
    assert_eq!(mean, expected);
}

#[test]
fn test_batch_size_does_not_change_results() {
    let dir = tempfile::tempdir().unwrap();
    let scene = BlobScene::new(LY, LX, 42);
    let config = session_config(dir.path(), LY, LX);
    let reference = quantize(&scene.render(LY, LX, 0.0, 0.0));
    let masks = prepare_masks(&reference, 0.0, &config, None).unwrap();

    let mut small = setup(dir.path(), "small.bin", &scene);
    let mut large = setup(dir.path(), "large.bin", &scene);
    let a = RegistrationEngine::new(&masks, &mut small, NFRAMES, 7, false)
        .unwrap()
        .run(|_| Ok(()))
        .unwrap();
    let b = RegistrationEngine::new(&masks, &mut large, NFRAMES, 60, false)
        .unwrap()
        .run(|_| Ok(()))
        .unwrap();
    drop(small);
    drop(large);

    assert_eq!(a.offsets, b.offsets);
    assert_eq!(
        read_movie(&dir.path().join("small.bin"), LY, LX),
        read_movie(&dir.path().join("large.bin"), LY, LX)
    );
}

#[test]
fn test_step_is_resumable() {
    let dir = tempfile::tempdir().unwrap();
    let scene = BlobScene::new(LY, LX, 43);
    let config = session_config(dir.path(), LY, LX);
    let reference = quantize(&scene.render(LY, LX, 0.0, 0.0));
    let masks = prepare_masks(&reference, 0.0, &config, None).unwrap();

    let mut stream = setup(dir.path(), "data.bin", &scene);
    let mut engine = RegistrationEngine::new(&masks, &mut stream, NFRAMES, 10, false).unwrap();
    let mut done = Vec::new();
    while let Some(batch) = engine.step().unwrap() {
        // Frames past the current batch are not yet registered.
        if batch.frames_done < NFRAMES {
            assert_eq!(batch.offsets.rigid(batch.frames_done).corr, 0.0);
        }
        done.push(batch.frames_done);
    }
    assert!(engine.is_finished());
    assert!(engine.step().unwrap().is_none());
    assert_eq!(done, vec![10, 20, 23]);
    assert_eq!(engine.finish().unwrap().nframes, NFRAMES);
}

#[test]
fn test_replicated_channel_matches_aligned_channel() {
    let dir = tempfile::tempdir().unwrap();
    let scene = BlobScene::new(LY, LX, 44);
    let config = session_config(dir.path(), LY, LX);
    let reference = quantize(&scene.render(LY, LX, 0.0, 0.0));
    let masks = prepare_masks(&reference, 0.0, &config, None).unwrap();

    let mut aligned = setup(dir.path(), "data.bin", &scene);
    let mut second = setup(dir.path(), "data_chan2.bin", &scene);
    let pass = RegistrationEngine::new(&masks, &mut aligned, NFRAMES, 8, false)
        .unwrap()
        .run(|_| Ok(()))
        .unwrap();
    let mut batches = 0;
    let replica = ShiftReplicator::new(&mut second, &pass.offsets, None, 0.0, NFRAMES, 5)
        .unwrap()
        .run(|batch| {
            assert!(batch.frames_done <= batch.nframes);
            assert_eq!(batch.mean_so_far.dim(), (LY, LX));
            batches += 1;
            Ok(())
        })
        .unwrap();
    drop(aligned);
    drop(second);

    assert_eq!(batches, 5);
    assert_eq!(replica.nframes, NFRAMES);
    assert_eq!(replica.sum_image, pass.sum_image);
    assert_eq!(
        read_movie(&dir.path().join("data.bin"), LY, LX),
        read_movie(&dir.path().join("data_chan2.bin"), LY, LX)
    );
}

#[test]
fn test_engine_rejects_mismatched_stream() {
    let dir = tempfile::tempdir().unwrap();
    let scene = BlobScene::new(LY, LX, 45);
    let config = session_config(dir.path(), 32, 32);
    let reference = scene.render(32, 32, 0.0, 0.0);
    let masks = prepare_masks(&reference, 0.0, &config, None).unwrap();
    let mut stream = setup(dir.path(), "data.bin", &scene);
    assert!(RegistrationEngine::new(&masks, &mut stream, NFRAMES, 8, false).is_err());

    let masks = prepare_masks(&quantize(&scene.render(LY, LX, 0.0, 0.0)), 0.0, &session_config(dir.path(), LY, LX), None).unwrap();
    assert!(RegistrationEngine::new(&masks, &mut stream, NFRAMES + 1, 8, false).is_err());
}
