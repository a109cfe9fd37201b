use std::sync::Arc;

use ndarray::{Array2, ArrayView2, ArrayViewMut1};
use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

/// Planned forward and inverse 2D FFTs for one array shape.
///
/// Plans are built once and shared (`Arc`) so a single instance can serve
/// every frame of a session from any worker thread.
#[derive(Clone)]
pub struct Fft2d {
    height: usize,
    width: usize,
    row_forward: Arc<dyn Fft<f32>>,
    col_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    col_inverse: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for Fft2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2d")
            .field("height", &self.height)
            .field("width", &self.width)
            .finish()
    }
}

impl Fft2d {
    pub fn new(height: usize, width: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            height,
            width,
            row_forward: planner.plan_fft_forward(width),
            col_forward: planner.plan_fft_forward(height),
            row_inverse: planner.plan_fft_inverse(width),
            col_inverse: planner.plan_fft_inverse(height),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Forward transform of a real array.
    pub fn forward(&self, data: &ArrayView2<f32>) -> Array2<Complex32> {
        let mut spectrum = data.mapv(|v| Complex32::new(v, 0.0));
        self.forward_in_place(&mut spectrum);
        spectrum
    }

    pub fn forward_in_place(&self, data: &mut Array2<Complex32>) {
        transform(data, &self.row_forward, &self.col_forward);
    }

    /// Inverse transform, returning the real part normalized by `1/(h*w)`.
    pub fn inverse_real(&self, mut spectrum: Array2<Complex32>) -> Array2<f32> {
        transform(&mut spectrum, &self.row_inverse, &self.col_inverse);
        let scale = 1.0 / (self.height * self.width) as f32;
        spectrum.mapv(|c| c.re * scale)
    }
}

/// Row-wise then column-wise transform, in place.
fn transform(data: &mut Array2<Complex32>, row_plan: &Arc<dyn Fft<f32>>, col_plan: &Arc<dyn Fft<f32>>) {
    let (h, w) = data.dim();
    let scratch_len = row_plan
        .get_inplace_scratch_len()
        .max(col_plan.get_inplace_scratch_len());
    let mut scratch = vec![Complex32::default(); scratch_len];

    let mut lane = vec![Complex32::default(); w];
    for row in data.rows_mut() {
        process_lane(row, &mut lane, row_plan, &mut scratch);
    }

    lane.resize(h, Complex32::default());
    for col in data.columns_mut() {
        process_lane(col, &mut lane, col_plan, &mut scratch);
    }
}

fn process_lane(
    mut lane_view: ArrayViewMut1<Complex32>,
    buffer: &mut [Complex32],
    plan: &Arc<dyn Fft<f32>>,
    scratch: &mut [Complex32],
) {
    if let Some(slice) = lane_view.as_slice_mut() {
        plan.process_with_scratch(slice, scratch);
        return;
    }
    for (dst, src) in buffer.iter_mut().zip(lane_view.iter()) {
        *dst = *src;
    }
    plan.process_with_scratch(buffer, scratch);
    for (dst, src) in lane_view.iter_mut().zip(buffer.iter()) {
        *dst = *src;
    }
}
