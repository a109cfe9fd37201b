//! Replays known shifts onto the alternate channel.

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::align::bidiphase::apply_bidiphase;
use crate::align::blocks::BlockGrid;
use crate::align::warp::{apply_shifts, BlockField};
use crate::consts::PARALLEL_FRAME_THRESHOLD;
use crate::error::{Result, SteadyError};
use crate::frame::OffsetHistory;
use crate::io::binary::FrameStream;

use super::engine::{is_progress_batch, mean_of};

/// What the replicator yields after every batch.
pub struct ReplicaBatch<'a> {
    pub batch_index: usize,
    pub frames_done: usize,
    pub nframes: usize,
    /// Mean of the corrected frames so far.
    pub mean_so_far: Array2<f32>,
    pub corrected: &'a Array3<f32>,
}

/// Totals of a completed replay.
#[derive(Clone, Debug)]
pub struct ReplicaResult {
    pub sum_image: Array2<f32>,
    pub nframes: usize,
}

impl ReplicaResult {
    pub fn mean_image(&self) -> Array2<f32> {
        mean_of(&self.sum_image, self.nframes)
    }
}

/// Applies an existing displacement history to a second stream acquired in
/// lockstep with the alignment channel. No correlation is performed.
pub struct ShiftReplicator<'a> {
    stream: &'a mut FrameStream,
    offsets: &'a OffsetHistory,
    grid: Option<&'a BlockGrid>,
    bidiphase: f32,
    batch_size: usize,
    nframes: usize,
    cursor: usize,
    batch_index: usize,
    sum_image: Array2<f32>,
    batch: Array3<f32>,
}

impl<'a> ShiftReplicator<'a> {
    /// `bidiphase` is applied to every frame; pass 0 when the stream is
    /// already line-corrected.
    pub fn new(
        stream: &'a mut FrameStream,
        offsets: &'a OffsetHistory,
        grid: Option<&'a BlockGrid>,
        bidiphase: f32,
        nframes: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if offsets.len() < nframes {
            return Err(SteadyError::ShapeMismatch {
                expected: vec![nframes],
                actual: vec![offsets.len()],
            });
        }
        if let Some(grid) = grid {
            if offsets.nblocks() != grid.len() {
                return Err(SteadyError::ShapeMismatch {
                    expected: vec![nframes, grid.len()],
                    actual: vec![offsets.len(), offsets.nblocks()],
                });
            }
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

        let (ly, lx) = stream.dim();
        Ok(Self {
            stream,
            offsets,
            grid,
            bidiphase,
            batch_size,
            nframes,
            cursor: 0,
            batch_index: 0,
            sum_image: Array2::zeros((ly, lx)),
            batch: Array3::zeros((0, ly, lx)),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.nframes
    }

    /// Shift the next batch. Returns `None` once every frame is done.
    pub fn step(&mut self) -> Result<Option<ReplicaBatch<'_>>> {
        if self.is_finished() {
            return Ok(None);
        }
        let start = self.cursor;
        let count = self.batch_size.min(self.nframes - start);
        let mut frames = self.stream.read(start, count)?;

        let (offsets, grid, bidiphase) = (self.offsets, self.grid, self.bidiphase);
        let correct = |i: usize| -> Array2<f32> {
            let frame = frames.index_axis(Axis(0), i).to_owned();
            replay_shifts(offsets, grid, bidiphase, start + i, frame)
        };
        let results: Vec<Array2<f32>> = if count >= PARALLEL_FRAME_THRESHOLD {
            (0..count).into_par_iter().map(correct).collect()
        } else {
            (0..count).map(correct).collect()
        };

        for (i, corrected) in results.iter().enumerate() {
            self.sum_image += corrected;
            frames.index_axis_mut(Axis(0), i).assign(corrected);
        }
        self.stream.write(start, &frames.view())?;
        self.batch = frames;

        self.cursor += count;
        let batch_index = self.batch_index;
        self.batch_index += 1;
        if is_progress_batch(batch_index) || self.is_finished() {
            info!("Shifted {}/{} frames of the second channel", self.cursor, self.nframes);
        } else {
            debug!(batch = batch_index, frames = self.cursor, "Second-channel batch shifted");
        }

        Ok(Some(ReplicaBatch {
            batch_index,
            frames_done: self.cursor,
            nframes: self.nframes,
            mean_so_far: mean_of(&self.sum_image, self.cursor),
            corrected: &self.batch,
        }))
    }

    pub fn run<F>(mut self, mut on_batch: F) -> Result<ReplicaResult>
    where
        F: FnMut(&ReplicaBatch<'_>) -> Result<()>,
    {
        while let Some(batch) = self.step()? {
            on_batch(&batch)?;
        }
        self.finish()
    }

    pub fn finish(self) -> Result<ReplicaResult> {
        self.stream.flush()?;
        Ok(ReplicaResult {
            sum_image: self.sum_image,
            nframes: self.cursor,
        })
    }
}

/// Correct frame `index` with its recorded shifts.
pub fn replay_shifts(
    offsets: &OffsetHistory,
    grid: Option<&BlockGrid>,
    bidiphase: f32,
    index: usize,
    mut frame: Array2<f32>,
) -> Array2<f32> {
    if bidiphase != 0.0 {
        apply_bidiphase(&mut frame.view_mut(), bidiphase);
    }
    let rigid = offsets.rigid(index);
    let field = grid.map(|grid| {
        let (dy, dx) = offsets.block_shifts(index);
        BlockField { grid, dy, dx }
    });
    apply_shifts(&frame.view(), &rigid, field)
}
