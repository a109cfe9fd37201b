use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::{BLOCK_OVERLAP_FACTOR, MIN_BLOCK_SIZE};
use crate::error::{Result, SteadyError};

/// Axis-aligned pixel rectangle `[y0, y1) x [x0, x1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub y0: usize,
    pub y1: usize,
    pub x0: usize,
    pub x1: usize,
}

impl Block {
    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    /// Block centre in pixel coordinates.
    pub fn center(&self) -> (f32, f32) {
        (
            (self.y0 + self.y1 - 1) as f32 / 2.0,
            (self.x0 + self.x1 - 1) as f32 / 2.0,
        )
    }
}

/// Overlapping grid of equally sized blocks covering a frame.
///
/// Blocks are stored row-major: block `b` sits at grid position
/// `(b / nx, b % nx)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockGrid {
    pub blocks: Vec<Block>,
    pub ny: usize,
    pub nx: usize,
    /// Effective block size `[height, width]` after clamping to the frame.
    pub block_size: [usize; 2],
}

impl BlockGrid {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Centre rows of the block grid rows, ascending.
    pub fn row_centers(&self) -> Vec<f32> {
        (0..self.ny)
            .map(|iy| self.blocks[iy * self.nx].center().0)
            .collect()
    }

    /// Centre columns of the block grid columns, ascending.
    pub fn col_centers(&self) -> Vec<f32> {
        (0..self.nx).map(|ix| self.blocks[ix].center().1).collect()
    }

    /// Row-normalized Gaussian weights between blocks, measured in grid units.
    ///
    /// Row `b` holds the weights used to blend block `b` with its neighbours.
    pub fn smoothing_kernel(&self, sigma: f32) -> Array2<f32> {
        let nb = self.len();
        let denom = 2.0 * sigma * sigma;
        let mut kernel = Array2::<f32>::zeros((nb, nb));
        for i in 0..nb {
            let (iy, ix) = ((i / self.nx) as f32, (i % self.nx) as f32);
            let mut row_sum = 0.0;
            for j in 0..nb {
                let (jy, jx) = ((j / self.nx) as f32, (j % self.nx) as f32);
                let d2 = (iy - jy).powi(2) + (ix - jx).powi(2);
                let w = (-d2 / denom).exp();
                kernel[[i, j]] = w;
                row_sum += w;
            }
            kernel.row_mut(i).mapv_inplace(|w| w / row_sum);
        }
        kernel
    }
}

/// Partition an `ly x lx` frame into overlapping blocks.
///
/// Each axis gets `ceil(1.5 * L / size)` blocks spaced evenly between `0`
/// and `L - size`; a requested size at least as large as the frame yields a
/// single full-width block on that axis.
pub fn make_blocks(ly: usize, lx: usize, block_size: [usize; 2]) -> Result<BlockGrid> {
    let (by, ystarts) = blocks_along(ly, block_size[0], "height")?;
    let (bx, xstarts) = blocks_along(lx, block_size[1], "width")?;

    let mut blocks = Vec::with_capacity(ystarts.len() * xstarts.len());
    for &y0 in &ystarts {
        for &x0 in &xstarts {
            blocks.push(Block {
                y0,
                y1: y0 + by,
                x0,
                x1: x0 + bx,
            });
        }
    }

    Ok(BlockGrid {
        blocks,
        ny: ystarts.len(),
        nx: xstarts.len(),
        block_size: [by, bx],
    })
}

fn blocks_along(len: usize, requested: usize, axis: &str) -> Result<(usize, Vec<usize>)> {
    if requested == 0 {
        return Err(SteadyError::InvalidBlockGrid(format!(
            "block {axis} must be > 0"
        )));
    }

    let (size, count) = if requested >= len {
        (len, 1)
    } else {
        let count = (BLOCK_OVERLAP_FACTOR * len as f64 / requested as f64).ceil() as usize;
        (requested, count)
    };

    if size < MIN_BLOCK_SIZE {
        return Err(SteadyError::InvalidBlockGrid(format!(
            "block {axis} {size} is below the minimum correlation window of {MIN_BLOCK_SIZE} px \
             (frame {axis} {len}, requested {requested})"
        )));
    }

    let span = (len - size) as f64;
    let starts = if count == 1 {
        vec![0]
    } else {
        (0..count)
            .map(|i| (span * i as f64 / (count - 1) as f64) as usize)
            .collect()
    };

    Ok((size, starts))
}
