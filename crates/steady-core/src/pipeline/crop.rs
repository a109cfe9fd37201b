//! Valid-region and bad-frame bookkeeping over a full displacement history.

use num_traits::Float;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::align::masks::rigid_search_radius;
use crate::consts::{BADFRAME_FILTER_WINDOW, BADFRAME_SHIFT_FRACTION, EPSILON, MIN_CROP_EXTENT};
use crate::frame::OffsetHistory;

/// Pixel rectangle `[y_lo, y_hi) x [x_lo, x_hi)` free of shift edge artifacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub y_lo: usize,
    pub y_hi: usize,
    pub x_lo: usize,
    pub x_hi: usize,
}

impl CropRect {
    pub fn full(ly: usize, lx: usize) -> Self {
        Self {
            y_lo: 0,
            y_hi: ly,
            x_lo: 0,
            x_hi: lx,
        }
    }

    pub fn height(&self) -> usize {
        self.y_hi.saturating_sub(self.y_lo)
    }

    pub fn width(&self) -> usize {
        self.x_hi.saturating_sub(self.x_lo)
    }

    /// Too few rows or columns left to be usable.
    pub fn is_degenerate(&self) -> bool {
        self.height() < MIN_CROP_EXTENT || self.width() < MIN_CROP_EXTENT
    }
}

/// Largest absolute correction per axis over all frames, including the
/// total (rigid + residual) shift of every block.
pub fn max_abs_shift(offsets: &OffsetHistory) -> (f32, f32) {
    let mut max_y = 0.0f32;
    let mut max_x = 0.0f32;
    for t in 0..offsets.len() {
        let ry = offsets.yoff[t];
        let rx = offsets.xoff[t];
        max_y = max_y.max(ry.abs());
        max_x = max_x.max(rx.abs());
        for b in 0..offsets.nblocks() {
            max_y = max_y.max((ry + offsets.yoff1[[t, b]]).abs());
            max_x = max_x.max((rx + offsets.xoff1[[t, b]]).abs());
        }
    }
    (max_y, max_x)
}

/// Crop away a border as wide as the largest observed shift on each axis.
///
/// A degenerate result is logged but still returned; the caller decides
/// whether to use it.
pub fn compute_crop(offsets: &OffsetHistory, ly: usize, lx: usize) -> CropRect {
    let (max_y, max_x) = max_abs_shift(offsets);
    let my = max_y.ceil() as usize;
    let mx = max_x.ceil() as usize;
    let rect = CropRect {
        y_lo: my.min(ly),
        y_hi: ly.saturating_sub(my).max(my.min(ly)),
        x_lo: mx.min(lx),
        x_hi: lx.saturating_sub(mx).max(mx.min(lx)),
    };
    if rect.is_degenerate() {
        warn!(
            "Degenerate crop {}x{} after max shift ({:.1}, {:.1}) on a {}x{} frame",
            rect.height(),
            rect.width(),
            max_y,
            max_x,
            ly,
            lx
        );
    }
    rect
}

/// Flag frames with anomalous motion.
///
/// A frame is flagged when its rigid shift jumps away from the
/// median-filtered trajectory relative to how well it correlated (scaled by
/// `100 * th_badframes`), or when the shift reaches the edge of the search
/// window.
pub fn detect_bad_frames(
    offsets: &OffsetHistory,
    ly: usize,
    lx: usize,
    maxregshift: f32,
    th_badframes: f32,
) -> Vec<bool> {
    let n = offsets.len();
    if n == 0 {
        return Vec::new();
    }
    let window = (((n / 2) * 2).saturating_sub(1)).clamp(1, BADFRAME_FILTER_WINDOW);

    let yoff: Vec<f32> = offsets.yoff.to_vec();
    let xoff: Vec<f32> = offsets.xoff.to_vec();
    let corr: Vec<f32> = offsets.corr_xy.to_vec();
    let dy = median_filter(&yoff, window);
    let dx = median_filter(&xoff, window);
    let mut dxy: Vec<f32> = (0..n)
        .map(|t| ((yoff[t] - dy[t]).powi(2) + (xoff[t] - dx[t]).powi(2)).sqrt())
        .collect();
    let mean_dxy = dxy.iter().sum::<f32>() / n as f32;

    let mut bad = vec![false; n];
    if mean_dxy > EPSILON {
        dxy.iter_mut().for_each(|v| *v /= mean_dxy);
        let corr_med = median_filter(&corr, window);
        let threshold = 100.0 * th_badframes;
        for t in 0..n {
            let c = (corr[t] / corr_med[t]).max(0.0);
            let px = dxy[t] / c;
            if px > threshold {
                bad[t] = true;
            }
        }
    }

    let limit = BADFRAME_SHIFT_FRACTION * rigid_search_radius(ly, lx, maxregshift) as f32;
    for t in 0..n {
        if yoff[t].abs() > limit || xoff[t].abs() > limit {
            bad[t] = true;
        }
    }
    bad
}

/// Sliding median with zero padding at both ends.
pub fn median_filter<T: Float>(values: &[T], window: usize) -> Vec<T> {
    let half = window / 2;
    let n = values.len();
    let mut buf = Vec::with_capacity(window);
    (0..n)
        .map(|i| {
            buf.clear();
            for k in 0..window {
                let j = i as isize + k as isize - half as isize;
                if j < 0 || j >= n as isize {
                    buf.push(T::zero());
                } else {
                    buf.push(values[j as usize]);
                }
            }
            buf.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            buf[buf.len() / 2]
        })
        .collect()
}
