use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SteadyError};

/// Whole-frame displacement estimate for a single frame.
///
/// `dy`/`dx` are the correction applied to the frame: the registered frame
/// is `out(y, x) = in(y - dy, x - dx)`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RigidShift {
    pub dy: f32,
    pub dx: f32,
    /// Phase-correlation peak height (not clamped).
    pub corr: f32,
}

/// Residual per-block displacement of one frame, on top of its rigid shift.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockShifts {
    pub dy: Vec<f32>,
    pub dx: Vec<f32>,
    pub corr: Vec<f32>,
}

impl BlockShifts {
    pub fn zeros(nblocks: usize) -> Self {
        Self {
            dy: vec![0.0; nblocks],
            dx: vec![0.0; nblocks],
            corr: vec![0.0; nblocks],
        }
    }

    pub fn len(&self) -> usize {
        self.dy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dy.is_empty()
    }
}

/// Per-frame displacement history of a session.
///
/// Allocated once for the full frame count; the engine writes each frame's
/// shifts at the frame's own index. Nonrigid arrays have shape
/// `(nframes, nblocks)` and zero columns for rigid-only sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OffsetHistory {
    pub yoff: Array1<f32>,
    pub xoff: Array1<f32>,
    pub corr_xy: Array1<f32>,
    pub yoff1: Array2<f32>,
    pub xoff1: Array2<f32>,
    pub corr_xy1: Array2<f32>,
}

impl OffsetHistory {
    pub fn zeros(nframes: usize, nblocks: usize) -> Self {
        Self {
            yoff: Array1::zeros(nframes),
            xoff: Array1::zeros(nframes),
            corr_xy: Array1::zeros(nframes),
            yoff1: Array2::zeros((nframes, nblocks)),
            xoff1: Array2::zeros((nframes, nblocks)),
            corr_xy1: Array2::zeros((nframes, nblocks)),
        }
    }

    pub fn len(&self) -> usize {
        self.yoff.len()
    }

    pub fn is_empty(&self) -> bool {
        self.yoff.is_empty()
    }

    pub fn nblocks(&self) -> usize {
        self.yoff1.ncols()
    }

    pub fn is_nonrigid(&self) -> bool {
        self.nblocks() > 0
    }

    /// Store the shifts of frame `index`.
    pub fn record(&mut self, index: usize, rigid: &RigidShift, blocks: Option<&BlockShifts>) {
        self.yoff[index] = rigid.dy;
        self.xoff[index] = rigid.dx;
        self.corr_xy[index] = rigid.corr;
        if let Some(blocks) = blocks {
            for b in 0..self.nblocks().min(blocks.len()) {
                self.yoff1[[index, b]] = blocks.dy[b];
                self.xoff1[[index, b]] = blocks.dx[b];
                self.corr_xy1[[index, b]] = blocks.corr[b];
            }
        }
    }

    pub fn rigid(&self, index: usize) -> RigidShift {
        RigidShift {
            dy: self.yoff[index],
            dx: self.xoff[index],
            corr: self.corr_xy[index],
        }
    }

    /// Residual block shifts `(dy, dx)` of frame `index`.
    pub fn block_shifts(&self, index: usize) -> (ArrayView1<'_, f32>, ArrayView1<'_, f32>) {
        (self.yoff1.row(index), self.xoff1.row(index))
    }

    /// Add the shifts of a later pass over the same frames.
    ///
    /// Correlation values are replaced rather than summed: they describe the
    /// latest match against the latest reference.
    pub fn accumulate(&mut self, pass: &OffsetHistory) -> Result<()> {
        if self.yoff1.dim() != pass.yoff1.dim() || self.len() != pass.len() {
            return Err(SteadyError::ShapeMismatch {
                expected: vec![self.len(), self.nblocks()],
                actual: vec![pass.len(), pass.nblocks()],
            });
        }
        self.yoff += &pass.yoff;
        self.xoff += &pass.xoff;
        self.corr_xy.assign(&pass.corr_xy);
        self.yoff1 += &pass.yoff1;
        self.xoff1 += &pass.xoff1;
        self.corr_xy1.assign(&pass.corr_xy1);
        Ok(())
    }
}
