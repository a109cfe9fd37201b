use ndarray::{Array2, ArrayView2};

use crate::consts::SPECTRUM_EPSILON;
use crate::fft::Fft2d;
use crate::frame::RigidShift;

use super::masks::{CorrelationMask, RefAndMasks};
use super::subpixel::refine_peak_paraboloid;

/// Phase-correlation surface of `frame` against a precomputed reference mask.
///
/// The frame is tapered, transformed, whitened to unit magnitude and
/// multiplied with the reference spectrum. A peak at `(py, px)` (with
/// wrap-around) means the frame content sits displaced by `(py, px)` from the
/// reference.
pub fn correlation_surface(fft: &Fft2d, mask: &CorrelationMask, frame: &ArrayView2<f32>) -> Array2<f32> {
    let tapered = mask.apply(frame);
    let mut spectrum = fft.forward(&tapered.view());
    ndarray::Zip::from(&mut spectrum)
        .and(&mask.cf_ref)
        .for_each(|f, &r| {
            *f = *f / (SPECTRUM_EPSILON + f.norm()) * r;
        });
    fft.inverse_real(spectrum)
}

/// Copy the `(2 * radius + 1)^2` neighbourhood of the zero-shift origin out of
/// a wrap-around correlation surface. Index `radius` is zero displacement.
pub fn centered_window(surface: &Array2<f32>, radius: usize) -> Array2<f32> {
    let (h, w) = surface.dim();
    let size = 2 * radius + 1;
    Array2::from_shape_fn((size, size), |(i, j)| {
        let r = (i as isize - radius as isize).rem_euclid(h as isize) as usize;
        let c = (j as isize - radius as isize).rem_euclid(w as isize) as usize;
        surface[[r, c]]
    })
}

/// Sub-pixel peak of a centred window, searching within `search` pixels of
/// the centre.
///
/// Returns `(dy, dx, peak)` where `(dy, dx)` is the displacement of the peak
/// from the window centre.
pub fn locate_peak(window: &Array2<f32>, search: usize) -> (f32, f32, f32) {
    let (h, w) = window.dim();
    let (cy, cx) = (h / 2, w / 2);
    let (peak, best) = argmax_within(window, search);

    let (sub_r, sub_c) = refine_peak_paraboloid(window, peak.0, peak.1);
    (
        peak.0 as f32 - cy as f32 + sub_r,
        peak.1 as f32 - cx as f32 + sub_c,
        best,
    )
}

/// Integer position and value of the largest sample within `search` pixels
/// of the window centre.
pub fn argmax_within(window: &Array2<f32>, search: usize) -> ((usize, usize), f32) {
    let (h, w) = window.dim();
    let (cy, cx) = (h / 2, w / 2);
    let y_range = cy.saturating_sub(search)..(cy + search + 1).min(h);
    let x_range = cx.saturating_sub(search)..(cx + search + 1).min(w);

    let mut best = f32::NEG_INFINITY;
    let mut peak = (cy, cx);
    for r in y_range {
        for c in x_range.clone() {
            let v = window[[r, c]];
            if v > best {
                best = v;
                peak = (r, c);
            }
        }
    }
    (peak, best)
}

/// Estimate the whole-frame correction for `frame`.
pub fn estimate_rigid(masks: &RefAndMasks, frame: &ArrayView2<f32>) -> RigidShift {
    let radius = masks.params.rigid_radius;
    let surface = correlation_surface(&masks.fft, &masks.rigid, frame);
    // One extra ring so a peak on the search boundary still gets refined.
    let window = centered_window(&surface, radius + 1);
    let (py, px, corr) = locate_peak(&window, radius);

    RigidShift {
        dy: -py,
        dx: -px,
        corr,
    }
}
