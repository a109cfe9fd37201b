use ndarray::Array2;

/// Vertex offset of the parabola through three equally spaced samples.
///
/// Returns the fractional position of the maximum relative to the middle
/// sample, clamped to +/- 0.5.
pub fn parabolic_offset(prev: f32, curr: f32, next: f32) -> f32 {
    let denom = prev - 2.0 * curr + next;
    if denom.abs() > 1e-12 {
        ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
    } else {
        0.0
    }
}

/// Refine peak location using paraboloid fitting on the 3x3 neighborhood.
///
/// Returns (delta_row, delta_col) as fractional pixel offsets from the integer peak.
pub fn refine_peak_paraboloid(correlation: &Array2<f32>, peak_row: usize, peak_col: usize) -> (f32, f32) {
    let (h, w) = correlation.dim();

    // Need 3x3 neighborhood -- if peak is at edge, skip refinement
    if peak_row == 0 || peak_row >= h - 1 || peak_col == 0 || peak_col >= w - 1 {
        return (0.0, 0.0);
    }

    let curr = correlation[[peak_row, peak_col]];
    let delta_row = parabolic_offset(
        correlation[[peak_row - 1, peak_col]],
        curr,
        correlation[[peak_row + 1, peak_col]],
    );
    let delta_col = parabolic_offset(
        correlation[[peak_row, peak_col - 1]],
        curr,
        correlation[[peak_row, peak_col + 1]],
    );

    (delta_row, delta_col)
}
