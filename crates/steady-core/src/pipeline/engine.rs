//! Streamed batch registration of the alignment channel.

use std::time::Instant;

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::align::masks::RefAndMasks;
use crate::align::{register_frame, FrameRegistration};
use crate::consts::{PARALLEL_FRAME_THRESHOLD, PROGRESS_LOG_INTERVAL};
use crate::error::{Result, SteadyError};
use crate::frame::OffsetHistory;
use crate::io::binary::FrameStream;

/// Batches logged at `info` level: the first and every fifth after it.
pub(crate) fn is_progress_batch(batch_index: usize) -> bool {
    batch_index % PROGRESS_LOG_INTERVAL == 0
}

/// What the engine yields after every batch.
///
/// `offsets` holds valid values for frames `0..frames_done`; later entries
/// are still zero.
pub struct BatchOutput<'a> {
    pub batch_index: usize,
    pub frames_done: usize,
    pub nframes: usize,
    pub offsets: &'a OffsetHistory,
    pub sum_image: &'a Array2<f32>,
    pub corrected: &'a Array3<f32>,
}

/// Totals of a completed pass.
#[derive(Clone, Debug)]
pub struct PassResult {
    pub offsets: OffsetHistory,
    pub sum_image: Array2<f32>,
    pub nframes: usize,
}

impl PassResult {
    /// Sum image divided by the number of frames accumulated.
    pub fn mean_image(&self) -> Array2<f32> {
        mean_of(&self.sum_image, self.nframes)
    }
}

pub(crate) fn mean_of(sum: &Array2<f32>, count: usize) -> Array2<f32> {
    if count == 0 {
        return sum.clone();
    }
    sum / count as f32
}

/// Registers a frame stream against precomputed masks, one batch per step.
///
/// Each batch is read, registered (frames in parallel), written back at the
/// same indices, and then released.
pub struct RegistrationEngine<'a> {
    masks: &'a RefAndMasks,
    stream: &'a mut FrameStream,
    batch_size: usize,
    nframes: usize,
    apply_bidi: bool,
    cursor: usize,
    batch_index: usize,
    offsets: OffsetHistory,
    sum_image: Array2<f32>,
    batch: Array3<f32>,
    started: Instant,
}

impl<'a> RegistrationEngine<'a> {
    /// `apply_bidi` is false when the stream already had its line-scan
    /// offset corrected by an earlier pass.
    pub fn new(
        masks: &'a RefAndMasks,
        stream: &'a mut FrameStream,
        nframes: usize,
        batch_size: usize,
        apply_bidi: bool,
    ) -> Result<Self> {
        if masks.dim() != stream.dim() {
            let (ly, lx) = masks.dim();
            let (sy, sx) = stream.dim();
            return Err(SteadyError::ShapeMismatch {
                expected: vec![ly, lx],
                actual: vec![sy, sx],
            });
        }
        if nframes > stream.nframes() {
            return Err(SteadyError::FrameRangeOutOfBounds {
                start: 0,
                end: nframes,
                total: stream.nframes(),
            });
        }
        if batch_size == 0 {
            return Err(SteadyError::InvalidConfig("batch_size must be > 0".into()));
        }

        let nblocks = masks.blocks.as_ref().map(|b| b.grid.len()).unwrap_or(0);
        let (ly, lx) = masks.dim();
        Ok(Self {
            masks,
            stream,
            batch_size,
            nframes,
            apply_bidi,
            cursor: 0,
            batch_index: 0,
            offsets: OffsetHistory::zeros(nframes, nblocks),
            sum_image: Array2::zeros((ly, lx)),
            batch: Array3::zeros((0, ly, lx)),
            started: Instant::now(),
        })
    }

    pub fn frames_done(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.nframes
    }

    /// Register the next batch. Returns `None` once every frame is done.
    pub fn step(&mut self) -> Result<Option<BatchOutput<'_>>> {
        if self.is_finished() {
            return Ok(None);
        }
        let start = self.cursor;
        let count = self.batch_size.min(self.nframes - start);
        let frames = self.stream.read(start, count)?;

        let masks = self.masks;
        let apply_bidi = self.apply_bidi;
        let register = |i: usize| -> FrameRegistration {
            register_frame(masks, frames.index_axis(Axis(0), i).to_owned(), apply_bidi)
        };
        let results: Vec<FrameRegistration> = if count >= PARALLEL_FRAME_THRESHOLD {
            (0..count).into_par_iter().map(register).collect()
        } else {
            (0..count).map(register).collect()
        };
        drop(frames);

        let (ly, lx) = self.masks.dim();
        let mut corrected = Array3::<f32>::zeros((count, ly, lx));
        for (i, result) in results.into_iter().enumerate() {
            self.offsets
                .record(start + i, &result.rigid, result.blocks.as_ref());
            self.sum_image += &result.corrected;
            corrected.index_axis_mut(Axis(0), i).assign(&result.corrected);
        }
        self.stream.write(start, &corrected.view())?;
        self.batch = corrected;

        self.cursor += count;
        let batch_index = self.batch_index;
        self.batch_index += 1;

        if is_progress_batch(batch_index) || self.is_finished() {
            info!(
                frames = self.cursor,
                total = self.nframes,
                elapsed_s = self.started.elapsed().as_secs_f64(),
                "Registered {}/{} frames",
                self.cursor,
                self.nframes
            );
        } else {
            debug!(batch = batch_index, frames = self.cursor, "Batch registered");
        }

        Ok(Some(BatchOutput {
            batch_index,
            frames_done: self.cursor,
            nframes: self.nframes,
            offsets: &self.offsets,
            sum_image: &self.sum_image,
            corrected: &self.batch,
        }))
    }

    /// Run to completion, handing every batch to `on_batch`.
    pub fn run<F>(mut self, mut on_batch: F) -> Result<PassResult>
    where
        F: FnMut(&BatchOutput<'_>) -> Result<()>,
    {
        while let Some(output) = self.step()? {
            on_batch(&output)?;
        }
        self.finish()
    }

    /// Flush the output stream and return the accumulated totals.
    pub fn finish(self) -> Result<PassResult> {
        self.stream.flush()?;
        Ok(PassResult {
            offsets: self.offsets,
            sum_image: self.sum_image,
            nframes: self.cursor,
        })
    }
}
