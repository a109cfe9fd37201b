//! Residual per-block shift estimation.
//!
//! Runs on a frame that already had its rigid correction applied. Blocks
//! whose correlation peak does not stand out from the background are
//! replaced by a neighbour-weighted average of the surfaces, repeatedly,
//! before the peak is located.

use ndarray::{s, Array2, ArrayView2};

use crate::consts::{EPSILON, NONRIGID_PAD};
use crate::frame::BlockShifts;

use super::masks::{BlockMasks, RefAndMasks};
use super::phase_correlation::{argmax_within, centered_window, correlation_surface, locate_peak};

/// Estimate residual shifts for every block of `shifted`, or `None` when the
/// masks were prepared without a block grid.
pub fn estimate_blocks(masks: &RefAndMasks, shifted: &ArrayView2<f32>) -> Option<BlockShifts> {
    let blocks = masks.blocks.as_ref()?;
    let radius = masks.params.block_radius;

    let raw = block_windows(blocks, shifted, radius + NONRIGID_PAD);
    let surfaces = smooth_low_snr(
        &blocks.smoothing,
        raw,
        radius,
        masks.params.snr_thresh,
        masks.params.smooth_passes,
    );

    let mut shifts = BlockShifts::zeros(surfaces.len());
    for (b, window) in surfaces.iter().enumerate() {
        let (py, px, corr) = locate_peak(window, radius);
        shifts.dy[b] = -py;
        shifts.dx[b] = -px;
        shifts.corr[b] = corr;
    }
    Some(shifts)
}

fn block_windows(blocks: &BlockMasks, frame: &ArrayView2<f32>, radius: usize) -> Vec<Array2<f32>> {
    blocks
        .grid
        .blocks
        .iter()
        .zip(&blocks.masks)
        .map(|(b, mask)| {
            let sub = frame.slice(s![b.y0..b.y1, b.x0..b.x1]);
            let surface = correlation_surface(&blocks.fft, mask, &sub);
            centered_window(&surface, radius)
        })
        .collect()
}

/// Peak-to-background ratio of a centred window.
///
/// The background is the largest value outside a `NONRIGID_PAD` neighbourhood
/// of the peak found within `search` of the centre.
pub fn peak_snr(window: &Array2<f32>, search: usize) -> f32 {
    let ((pr, pc), peak) = argmax_within(window, search);
    let (pr, pc) = (pr as isize, pc as isize);

    let pad = NONRIGID_PAD as isize;
    let mut background = f32::NEG_INFINITY;
    for ((r, c), &v) in window.indexed_iter() {
        if (r as isize - pr).abs() <= pad && (c as isize - pc).abs() <= pad {
            continue;
        }
        background = background.max(v);
    }

    peak / background.max(EPSILON)
}

/// Replace surfaces of low-SNR blocks with progressively stronger
/// neighbour averages: pass `k` uses `smoothing^k` applied to the raw
/// surfaces. Blocks that reach the threshold keep their current surface.
pub fn smooth_low_snr(
    smoothing: &Array2<f32>,
    raw: Vec<Array2<f32>>,
    search: usize,
    snr_thresh: f32,
    passes: usize,
) -> Vec<Array2<f32>> {
    let mut snr: Vec<f32> = raw.iter().map(|w| peak_snr(w, search)).collect();
    let mut current = raw.clone();
    let mut smoothed = raw;

    for _ in 0..passes {
        if snr.iter().all(|&v| v >= snr_thresh) {
            break;
        }
        smoothed = blend(smoothing, &smoothed);
        for b in 0..current.len() {
            if snr[b] < snr_thresh {
                current[b].assign(&smoothed[b]);
                snr[b] = peak_snr(&current[b], search);
            }
        }
    }
    current
}

fn blend(weights: &Array2<f32>, surfaces: &[Array2<f32>]) -> Vec<Array2<f32>> {
    weights
        .rows()
        .into_iter()
        .map(|row| {
            let mut acc = Array2::<f32>::zeros(surfaces[0].dim());
            for (w, surface) in row.iter().zip(surfaces) {
                if *w != 0.0 {
                    acc.scaled_add(*w, surface);
                }
            }
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spike(size: usize, at: (usize, usize), height: f32) -> Array2<f32> {
        let mut w = Array2::from_elem((size, size), 0.01);
        w[at] = height;
        w
    }

    #[test]
    fn test_sharp_peak_has_high_snr() {
        let w = spike(11, (5, 6), 1.0);
        assert!(peak_snr(&w, 2) > 10.0);
    }

    #[test]
    fn test_flat_window_has_unit_snr() {
        let w = Array2::from_elem((11, 11), 0.5);
        assert!((peak_snr(&w, 2) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_low_snr_block_borrows_neighbour_peak() {
        // Two blocks, equal weights: the flat one inherits the other's peak.
        let weights = Array2::from_elem((2, 2), 0.5);
        let good = spike(11, (4, 5), 1.0);
        let flat = Array2::from_elem((11, 11), 0.1);
        let out = smooth_low_snr(&weights, vec![good.clone(), flat], 2, 1.2, 2);
        assert_eq!(out[0], good);
        let (dy, dx, _) = locate_peak(&out[1], 2);
        assert!((dy.round() + 1.0).abs() < 1e-6);
        assert!(dx.round().abs() < 1e-6);
    }
}
