mod common;

use std::fs::File;
use std::io::BufReader;

use ndarray::{Array2, Array3, Axis};

use steady_core::error::SteadyError;
use steady_core::io::binary::{frames_in_file, to_u16, BinaryMovie, FrameStream};
use steady_core::io::image_io::{save_image, save_png, save_tiff};
use steady_core::io::npy::read_npy_indices;
use steady_core::io::preview::{write_stack, ChannelRole, PreviewSink, TiffStackWriter};
use steady_core::pipeline::config::RegistrationConfig;

use common::{read_movie, write_movie, write_npy_i64, BlobScene};

fn ramp(ly: usize, lx: usize, offset: f32) -> Array2<f32> {
    Array2::from_shape_fn((ly, lx), |(r, c)| offset + (r * lx + c) as f32)
}

#[test]
fn test_binary_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("movie.bin");
    let frames: Vec<_> = (0..5).map(|t| ramp(6, 7, 100.0 * t as f32)).collect();
    write_movie(&path, &frames);

    assert_eq!(frames_in_file(&path, 6, 7).unwrap(), 5);
    let movie = BinaryMovie::open(&path, 6, 7, 5).unwrap();
    let batch = movie.read_frames(1, 3).unwrap();
    assert_eq!(batch.dim(), (3, 6, 7));
    assert_eq!(batch.index_axis(Axis(0), 0), frames[1]);
    assert_eq!(movie.read_frame(4).unwrap(), frames[4]);

    assert!(matches!(
        movie.read_frames(3, 3),
        Err(SteadyError::FrameRangeOutOfBounds { .. })
    ));
}

#[test]
fn test_write_rounds_and_clamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let mut movie = BinaryMovie::create(&path, 2, 2, 1).unwrap();
    let frame = Array3::from_shape_vec((1, 2, 2), vec![-5.0, 1.6, 70000.0, f32::NAN]).unwrap();
    movie.write_frames(0, &frame.view()).unwrap();
    movie.flush().unwrap();
    drop(movie);

    let back = read_movie(&path, 2, 2);
    assert_eq!(back.iter().copied().collect::<Vec<_>>(), vec![0.0, 2.0, 65535.0, 0.0]);
    assert_eq!(to_u16(2.5), 3);
}

#[test]
fn test_create_never_shrinks_existing_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let frames: Vec<_> = (0..5).map(|t| ramp(4, 4, 10.0 * t as f32)).collect();
    write_movie(&path, &frames);

    let mut movie = BinaryMovie::create(&path, 4, 4, 2).unwrap();
    assert_eq!(movie.nframes(), 2);
    movie.write_frames(0, &Array3::<f32>::zeros((2, 4, 4)).view()).unwrap();
    movie.flush().unwrap();
    drop(movie);

    assert_eq!(std::fs::metadata(&path).unwrap().len(), 5 * 4 * 4 * 2);
    let back = read_movie(&path, 4, 4);
    assert!(back.index_axis(Axis(0), 1).iter().all(|&v| v == 0.0));
    assert_eq!(back.index_axis(Axis(0), 2), frames[2]);
    assert_eq!(back.index_axis(Axis(0), 4), frames[4]);

    // Growing still works.
    let grown = BinaryMovie::create(&path, 4, 4, 8).unwrap();
    drop(grown);
    assert_eq!(frames_in_file(&path, 4, 4).unwrap(), 8);
}

#[test]
fn test_truncated_stream_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.bin");
    write_movie(&path, &[ramp(4, 4, 0.0), ramp(4, 4, 1.0)]);
    let err = BinaryMovie::open(&path, 4, 4, 3).unwrap_err();
    match err {
        SteadyError::TruncatedStream { expected, actual, .. } => {
            assert_eq!(expected, 96);
            assert_eq!(actual, 64);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_missing_stream_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nothing.bin");
    assert!(matches!(frames_in_file(&path, 4, 4), Err(SteadyError::MissingStream(_))));
    assert!(matches!(BinaryMovie::open(&path, 4, 4, 1), Err(SteadyError::MissingStream(_))));
}

#[test]
fn test_read_only_mapping_refuses_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.bin");
    write_movie(&path, &[ramp(3, 3, 0.0)]);
    let mut movie = BinaryMovie::open(&path, 3, 3, 1).unwrap();
    let frame = Array3::zeros((1, 3, 3));
    assert!(matches!(movie.write_frames(0, &frame.view()), Err(SteadyError::Io(_))));
}

#[test]
fn test_stream_with_sink_leaves_source_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw.bin");
    let reg = dir.path().join("reg.bin");
    let frames = vec![ramp(4, 5, 0.0), ramp(4, 5, 10.0)];
    write_movie(&raw, &frames);

    let source = BinaryMovie::open(&raw, 4, 5, 2).unwrap();
    let sink = BinaryMovie::create(&reg, 4, 5, 2).unwrap();
    let mut stream = FrameStream::with_sink(source, sink).unwrap();
    let batch = stream.read(0, 2).unwrap() + 1.0;
    stream.write(0, &batch.view()).unwrap();
    stream.flush().unwrap();
    drop(stream);

    assert_eq!(read_movie(&raw, 4, 5).index_axis(Axis(0), 1), frames[1]);
    assert_eq!(read_movie(&reg, 4, 5).index_axis(Axis(0), 1), frames[1].mapv(|v| v + 1.0));
}

#[test]
fn test_in_place_stream_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    write_movie(&path, &[ramp(4, 4, 0.0)]);
    let mut stream = FrameStream::in_place(BinaryMovie::open_mut(&path, 4, 4, 1).unwrap());
    assert_eq!(stream.dim(), (4, 4));
    assert_eq!(stream.nframes(), 1);
    let zeros = Array3::zeros((1, 4, 4));
    stream.write(0, &zeros.view()).unwrap();
    stream.flush().unwrap();
    drop(stream);
    assert!(read_movie(&path, 4, 4).iter().all(|&v| v == 0.0));
}

#[test]
fn test_preview_stack_pages() {
    let dir = tempfile::tempdir().unwrap();
    let scene = BlobScene::new(16, 20, 31);
    let mut stack = Array3::zeros((3, 16, 20));
    for t in 0..3 {
        stack.index_axis_mut(Axis(0), t).assign(&scene.render(16, 20, t as f32, 0.0));
    }
    let path = dir.path().join("stack.tif");
    write_stack(&stack.view(), &path).unwrap();

    let mut decoder = tiff::decoder::Decoder::new(BufReader::new(File::open(&path).unwrap())).unwrap();
    let mut pages = 1;
    assert_eq!(decoder.dimensions().unwrap(), (20, 16));
    while decoder.more_images() {
        decoder.next_image().unwrap();
        pages += 1;
    }
    assert_eq!(pages, 3);
}

#[test]
fn test_preview_writer_paths_follow_channel_roles() {
    let dir = tempfile::tempdir().unwrap();
    let config = RegistrationConfig {
        nchannels: 2,
        functional_chan: 1,
        align_by_chan: 2,
        reg_tif: true,
        reg_tif_chan2: false,
        save_path: dir.path().to_path_buf(),
        ..RegistrationConfig::default()
    };
    let mut writer = TiffStackWriter::from_config(&config);
    // Aligning by channel 2: the alternate role carries the functional channel.
    assert_eq!(
        writer.batch_path(ChannelRole::Alternate, 7),
        Some(dir.path().join("reg_tif").join("file007_chan0.tif"))
    );
    assert_eq!(writer.batch_path(ChannelRole::Alignment, 7), None);

    let batch = Array3::from_elem((2, 8, 8), 100.0f32);
    writer.write_batch(ChannelRole::Alternate, 0, &batch.view()).unwrap();
    writer.write_batch(ChannelRole::Alignment, 0, &batch.view()).unwrap();
    assert!(dir.path().join("reg_tif/file000_chan0.tif").exists());
    assert!(!dir.path().join("reg_tif_chan2").exists());
}

#[test]
fn test_save_images() {
    let dir = tempfile::tempdir().unwrap();
    let image = ramp(10, 12, 50.0);

    let tif = dir.path().join("mean.tif");
    save_tiff(&image, &tif).unwrap();
    let loaded = image::open(&tif).unwrap().into_luma16();
    assert_eq!(loaded.dimensions(), (12, 10));
    assert_eq!(loaded.get_pixel(3, 2)[0], 50 + 2 * 12 + 3);

    let png = dir.path().join("mean.png");
    save_png(&image, &png).unwrap();
    let loaded = image::open(&png).unwrap().into_luma8();
    assert_eq!(loaded.get_pixel(0, 0)[0], 0);
    assert_eq!(loaded.get_pixel(11, 9)[0], 255);

    let by_ext = dir.path().join("ref.png");
    save_image(&image, &by_ext).unwrap();
    assert!(by_ext.exists());
}

#[test]
fn test_npy_file_indices() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad_frames.npy");
    write_npy_i64(&path, &[4, 17, -1]);

    assert_eq!(read_npy_indices(&path).unwrap(), vec![4, 17, -1]);
}
