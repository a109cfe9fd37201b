//! Precomputed reference spectra and spatial tapers.
//!
//! The reference transform is identical for every frame, so it is computed
//! once per session (whole frame and, for nonrigid runs, every block) and
//! then shared read-only by all correlation work.

use ndarray::{s, Array2, ArrayView2};
use num_complex::Complex32;

use crate::consts::{BLOCK_TAPER_SLOPE, FRAME_TAPER_SLOPE, NONRIGID_PAD, SPECTRUM_EPSILON};
use crate::error::{Result, SteadyError};
use crate::fft::Fft2d;
use crate::pipeline::config::RegistrationConfig;

use super::blocks::BlockGrid;

/// Sigmoid edge taper: ~1 in the interior, falling to ~0 over `slope` pixels
/// near each border.
pub fn spatial_taper(slope: f32, ly: usize, lx: usize) -> Array2<f32> {
    let axis = |len: usize| -> Vec<f32> {
        let center = (len as f32 - 1.0) / 2.0;
        let knee = center - 2.0 * slope;
        (0..len)
            .map(|i| {
                let dist = (i as f32 - center).abs();
                1.0 / (1.0 + ((dist - knee) / slope).exp())
            })
            .collect()
    };
    let my = axis(ly);
    let mx = axis(lx);
    Array2::from_shape_fn((ly, lx), |(r, c)| my[r] * mx[c])
}

/// Frequency response of a unit-sum Gaussian of width `sigma` centred on the
/// origin (with wrap-around), used to low-pass the correlation surface.
pub fn gaussian_fft(fft: &Fft2d, sigma: f32) -> Array2<f32> {
    let (ly, lx) = fft.dim();
    let denom = 2.0 * sigma * sigma;
    let wrapped = |i: usize, len: usize| -> f32 { i.min(len - i) as f32 };
    let mut kernel = Array2::from_shape_fn((ly, lx), |(r, c)| {
        let dy = wrapped(r, ly);
        let dx = wrapped(c, lx);
        (-(dy * dy + dx * dx) / denom).exp()
    });
    let total = kernel.sum();
    kernel.mapv_inplace(|v| v / total);
    fft.forward(&kernel.view()).mapv(|c| c.re)
}

/// Taper and reference spectrum for one correlation window.
#[derive(Clone, Debug)]
pub struct CorrelationMask {
    pub mask_mul: Array2<f32>,
    pub mask_offset: Array2<f32>,
    /// `conj(F(ref)) / |F(ref)|`, low-passed by the Gaussian response.
    pub cf_ref: Array2<Complex32>,
}

impl CorrelationMask {
    /// Build the mask for `reference` with the given taper.
    pub fn build(fft: &Fft2d, reference: &ArrayView2<f32>, mask_mul: Array2<f32>, smooth: &Array2<f32>) -> Self {
        let mean = reference.mean().unwrap_or(0.0);
        let mask_offset = mask_mul.mapv(|m| mean * (1.0 - m));

        let tapered = &reference.view() * &mask_mul + &mask_offset;
        let spectrum = fft.forward(&tapered.view());
        let cf_ref = ndarray::Zip::from(&spectrum)
            .and(smooth)
            .map_collect(|&f, &g| f.conj() / (SPECTRUM_EPSILON + f.norm()) * g);

        Self {
            mask_mul,
            mask_offset,
            cf_ref,
        }
    }

    /// Taper `data` towards the reference mean at the borders.
    pub fn apply(&self, data: &ArrayView2<f32>) -> Array2<f32> {
        data * &self.mask_mul + &self.mask_offset
    }
}

/// Search limits used by every frame's correlation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchParams {
    /// Largest rigid shift searched, in pixels.
    pub rigid_radius: usize,
    /// Largest residual block shift searched, in pixels.
    pub block_radius: usize,
    pub snr_thresh: f32,
    pub smooth_passes: usize,
}

/// Per-block masks for nonrigid estimation.
#[derive(Clone, Debug)]
pub struct BlockMasks {
    pub grid: BlockGrid,
    pub masks: Vec<CorrelationMask>,
    pub fft: Fft2d,
    /// Row-normalized neighbour weights between blocks.
    pub smoothing: Array2<f32>,
}

/// Everything derived from the reference image, shared read-only by the
/// batch engine and its worker threads.
#[derive(Clone, Debug)]
pub struct RefAndMasks {
    pub reference: Array2<f32>,
    pub bidiphase: f32,
    pub fft: Fft2d,
    pub rigid: CorrelationMask,
    pub blocks: Option<BlockMasks>,
    pub params: SearchParams,
}

impl RefAndMasks {
    pub fn dim(&self) -> (usize, usize) {
        self.reference.dim()
    }
}

/// Largest rigid shift searched for an `ly x lx` frame.
pub fn rigid_search_radius(ly: usize, lx: usize, maxregshift: f32) -> usize {
    let min_dim = ly.min(lx);
    let radius = (maxregshift * min_dim as f32).round() as usize;
    radius.min(min_dim / 2).max(1)
}

/// Largest residual shift searched inside a `by x bx` block.
pub fn block_search_radius(by: usize, bx: usize, maxregshift_nr: usize) -> usize {
    let half = by.min(bx) / 2;
    maxregshift_nr
        .min(half.saturating_sub(NONRIGID_PAD))
        .max(1)
}

/// Precompute tapers and reference spectra for the whole frame and, when a
/// block grid is given, for every block.
pub fn prepare_masks(
    reference: &Array2<f32>,
    bidiphase: f32,
    config: &RegistrationConfig,
    grid: Option<&BlockGrid>,
) -> Result<RefAndMasks> {
    let (ly, lx) = reference.dim();
    if ly != config.ly || lx != config.lx {
        return Err(SteadyError::ShapeMismatch {
            expected: vec![config.ly, config.lx],
            actual: vec![ly, lx],
        });
    }

    let fft = Fft2d::new(ly, lx);
    let smooth = gaussian_fft(&fft, config.smooth_sigma);
    let rigid = CorrelationMask::build(
        &fft,
        &reference.view(),
        spatial_taper(FRAME_TAPER_SLOPE * config.smooth_sigma, ly, lx),
        &smooth,
    );

    let blocks = grid.map(|grid| prepare_block_masks(reference, &rigid.mask_mul, grid, config));
    let block_radius = grid
        .map(|g| block_search_radius(g.block_size[0], g.block_size[1], config.maxregshift_nr))
        .unwrap_or(0);

    Ok(RefAndMasks {
        reference: reference.clone(),
        bidiphase,
        fft,
        rigid,
        blocks,
        params: SearchParams {
            rigid_radius: rigid_search_radius(ly, lx, config.maxregshift),
            block_radius,
            snr_thresh: config.snr_thresh,
            smooth_passes: config.block_smooth_passes,
        },
    })
}

// Each block taper is the block's own sigmoid times the frame taper
// cropped to the block, so blocks on the frame border stay suppressed there.
fn prepare_block_masks(
    reference: &Array2<f32>,
    frame_taper: &Array2<f32>,
    grid: &BlockGrid,
    config: &RegistrationConfig,
) -> BlockMasks {
    let [by, bx] = grid.block_size;
    let fft = Fft2d::new(by, bx);
    let smooth = gaussian_fft(&fft, config.smooth_sigma);
    let block_taper = spatial_taper(BLOCK_TAPER_SLOPE * config.smooth_sigma, by, bx);

    let masks = grid
        .blocks
        .iter()
        .map(|b| {
            let sub = reference.slice(s![b.y0..b.y1, b.x0..b.x1]);
            let taper = &block_taper * &frame_taper.slice(s![b.y0..b.y1, b.x0..b.x1]);
            CorrelationMask::build(&fft, &sub, taper, &smooth)
        })
        .collect();

    BlockMasks {
        grid: grid.clone(),
        masks,
        fft,
        smoothing: grid.smoothing_kernel(config.block_smooth_sigma),
    }
}
