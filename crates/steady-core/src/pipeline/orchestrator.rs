use std::path::Path;
use std::sync::Arc;

use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::align::blocks::make_blocks;
use crate::align::masks::prepare_masks;
use crate::align::reference::{build_reference, ReferenceImage};
use crate::consts::{MIN_FRAMES, RECOMMENDED_MIN_FRAMES};
use crate::error::{Result, SteadyError};
use crate::frame::OffsetHistory;
use crate::io::binary::{frames_in_file, BinaryMovie, FrameStream};
use crate::io::npy::read_npy_indices;
use crate::io::preview::{ChannelRole, PreviewSink, TiffStackWriter};

use super::config::RegistrationConfig;
use super::crop::{compute_crop, detect_bad_frames};
use super::engine::RegistrationEngine;
use super::replicate::ShiftReplicator;
use super::session::{plan_streams, ChannelPaths, MovieSource, SessionRecord};
use super::types::{ProgressReporter, RegistrationStage};

/// Caller choices that are not part of the persisted configuration.
#[derive(Clone, Debug)]
pub struct RegisterOptions {
    /// Use this reference instead of building one from the movie.
    pub reference: Option<Array2<f32>>,
    /// Read the preserved raw stream when the session allows it.
    pub prefer_raw: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            reference: None,
            prefer_raw: true,
        }
    }
}

/// Register one session, writing preview stacks as the configuration asks.
pub fn register_session(
    config: &RegistrationConfig,
    prior: Option<&SessionRecord>,
    options: RegisterOptions,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<SessionRecord> {
    let mut previews = TiffStackWriter::from_config(config);
    register_session_with(config, prior, options, &mut previews, reporter)
}

/// Register one session, handing every corrected batch to `preview`.
///
/// `prior` is the record of an earlier run on the same data; its stream
/// state decides which files are read and its displacement history is
/// extended.
pub fn register_session_with(
    config: &RegistrationConfig,
    prior: Option<&SessionRecord>,
    options: RegisterOptions,
    preview: &mut dyn PreviewSink,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<SessionRecord> {
    config.validate()?;
    let (ly, lx) = (config.ly, config.lx);

    let prior = prior.filter(|p| {
        let matches = (p.ly, p.lx) == (ly, lx);
        if !matches {
            warn!(
                "Ignoring prior record for a {}x{} movie; session is {}x{}",
                p.ly, p.lx, ly, lx
            );
        }
        matches
    });
    let state = prior.map(|p| p.movie_source).unwrap_or_default();

    let grid = if config.nonrigid {
        let grid = make_blocks(ly, lx, config.block_size)?;
        info!(
            blocks = grid.len(),
            "Block grid {}x{} of {}x{} px",
            grid.ny,
            grid.nx,
            grid.block_size[0],
            grid.block_size[1]
        );
        Some(grid)
    } else {
        None
    };

    let plan = plan_streams(config, state, options.prefer_raw);
    let nframes = resolve_frame_count(config, &plan.alignment.input)?;
    // A raw stream never carries the line-scan correction.
    let bidi_corrected = plan.source == MovieSource::Registered && prior.is_some_and(|p| p.bidi_corrected);
    info!(
        nframes,
        source = ?plan.source,
        "Registering {} from {}",
        plan.alignment.output.display(),
        plan.alignment.input.display()
    );

    let mut align_stream = open_channel(&plan.alignment, ly, lx, nframes)?;

    reporter.begin_stage(RegistrationStage::Reference, None);
    let reference = match options.reference {
        Some(image) => {
            if image.dim() != (ly, lx) {
                return Err(SteadyError::ShapeMismatch {
                    expected: vec![ly, lx],
                    actual: vec![image.nrows(), image.ncols()],
                });
            }
            debug!("Using caller-supplied reference image");
            ReferenceImage {
                image,
                bidiphase: config.bidiphase,
            }
        }
        None => build_reference(align_stream.source(), nframes, config, bidi_corrected)?,
    };
    reporter.finish_stage();

    let masks = prepare_masks(&reference.image, reference.bidiphase, config, grid.as_ref())?;

    reporter.begin_stage(RegistrationStage::Registration, Some(nframes));
    let engine = RegistrationEngine::new(
        &masks,
        &mut align_stream,
        nframes,
        config.batch_size,
        !bidi_corrected,
    )?;
    let pass = engine.run(|out| {
        reporter.advance(out.frames_done);
        preview.write_batch(ChannelRole::Alignment, out.batch_index, &out.corrected.view())
    })?;
    reporter.finish_stage();
    drop(align_stream);
    let align_mean = pass.mean_image();

    let alt_mean = match &plan.alternate {
        Some(paths) => {
            reporter.begin_stage(RegistrationStage::AlternateChannel, Some(nframes));
            let mut stream = open_channel(paths, ly, lx, nframes)?;
            let bidiphase = if bidi_corrected { 0.0 } else { reference.bidiphase };
            let replica = ShiftReplicator::new(
                &mut stream,
                &pass.offsets,
                grid.as_ref(),
                bidiphase,
                nframes,
                config.batch_size,
            )?
            .run(|batch| {
                reporter.advance(batch.frames_done);
                preview.write_batch(ChannelRole::Alternate, batch.batch_index, &batch.corrected.view())
            })?;
            reporter.finish_stage();
            Some(replica.mean_image())
        }
        None => None,
    };

    reporter.begin_stage(RegistrationStage::Cropping, None);
    let offsets = extend_history(prior, plan.source, pass.offsets)?;

    let mut badframes = detect_bad_frames(&offsets, ly, lx, config.maxregshift, config.th_badframes);
    let detected = badframes.iter().filter(|&&b| b).count();
    if let Some(path) = config.bad_frames_path() {
        merge_external_bad_frames(&path, &mut badframes);
    }
    let flagged = badframes.iter().filter(|&&b| b).count();
    debug!(detected, flagged, "Bad-frame mask built");
    if flagged * 2 > nframes {
        warn!("{} of {} frames flagged as bad", flagged, nframes);
    }

    let crop = compute_crop(&offsets, ly, lx);
    reporter.finish_stage();

    // A corrected stream keeps the offset measured when it was corrected.
    let bidiphase = match prior {
        Some(p) if bidi_corrected => p.bidiphase,
        _ => reference.bidiphase,
    };
    let (mean_img, mean_img_chan2) = match alt_mean {
        Some(alt) if !config.aligns_by_functional() => (alt, Some(align_mean)),
        alt => (align_mean, alt),
    };

    info!(
        nframes,
        crop_y = ?(crop.y_lo, crop.y_hi),
        crop_x = ?(crop.x_lo, crop.x_hi),
        "Registration complete"
    );

    Ok(SessionRecord {
        config: config.clone(),
        ly,
        lx,
        nframes,
        movie_source: MovieSource::Registered,
        bidi_corrected: true,
        bidiphase,
        ref_img: reference.image,
        mean_img,
        mean_img_chan2,
        blocks: grid,
        offsets,
        badframes,
        crop,
    })
}

/// Frames available in `path`, capped by `frames_include`.
pub fn resolve_frame_count(config: &RegistrationConfig, path: &Path) -> Result<usize> {
    let available = frames_in_file(path, config.ly, config.lx)?;
    let nframes = config.frames_include.map_or(available, |cap| cap.min(available));
    if nframes < MIN_FRAMES {
        return Err(SteadyError::TooFewFrames {
            found: nframes,
            minimum: MIN_FRAMES,
        });
    }
    if nframes < RECOMMENDED_MIN_FRAMES {
        warn!(
            "Only {} frames; fewer than {} frames may give unreliable results",
            nframes, RECOMMENDED_MIN_FRAMES
        );
    }
    Ok(nframes)
}

fn open_channel(paths: &ChannelPaths, ly: usize, lx: usize, nframes: usize) -> Result<FrameStream> {
    if paths.is_in_place() {
        return Ok(FrameStream::in_place(BinaryMovie::open_mut(
            &paths.input,
            ly,
            lx,
            nframes,
        )?));
    }
    let source = BinaryMovie::open(&paths.input, ly, lx, nframes)?;
    let sink = BinaryMovie::create(&paths.output, ly, lx, nframes)?;
    FrameStream::with_sink(source, sink)
}

/// Add this pass onto the prior history when it describes the same frames
/// of the registered stream; otherwise this pass starts a new history.
fn extend_history(prior: Option<&SessionRecord>, source: MovieSource, pass: OffsetHistory) -> Result<OffsetHistory> {
    match prior {
        Some(p)
            if source == MovieSource::Registered
                && p.offsets.len() == pass.len()
                && p.offsets.nblocks() == pass.nblocks() =>
        {
            let mut history = p.offsets.clone();
            history.accumulate(&pass)?;
            debug!("Extended displacement history of {} frames", history.len());
            Ok(history)
        }
        Some(_) if source == MovieSource::Registered => {
            warn!("Prior displacement history does not match this run; starting a new one");
            Ok(pass)
        }
        _ => Ok(pass),
    }
}

fn merge_external_bad_frames(path: &Path, badframes: &mut [bool]) {
    if !path.exists() {
        return;
    }
    let indices = match read_npy_indices(path) {
        Ok(indices) => indices,
        Err(e) => {
            warn!("Ignoring unreadable bad-frame file {}: {}", path.display(), e);
            return;
        }
    };
    let n = badframes.len() as i64;
    let mut ignored = 0;
    for idx in indices {
        let resolved = if idx < 0 { idx + n } else { idx };
        if (0..n).contains(&resolved) {
            badframes[resolved as usize] = true;
        } else {
            ignored += 1;
        }
    }
    if ignored > 0 {
        warn!(
            "Ignored {} out-of-range indices in {}",
            ignored,
            path.display()
        );
    }
    info!("Loaded bad-frame indices from {}", path.display());
}
