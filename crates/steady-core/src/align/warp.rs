use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::frame::RigidShift;

use super::blocks::BlockGrid;

/// Bilinear sample at fractional coordinates; samples outside the frame
/// contribute zero.
pub fn bilinear_sample(data: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
    let (h, w) = data.dim();
    let y0 = y.floor() as isize;
    let x0 = x.floor() as isize;
    let fy = y - y0 as f32;
    let fx = x - x0 as f32;

    let get = |r: isize, c: isize| -> f32 {
        if r >= 0 && r < h as isize && c >= 0 && c < w as isize {
            data[[r as usize, c as usize]]
        } else {
            0.0
        }
    };

    let v00 = get(y0, x0);
    let v01 = get(y0, x0 + 1);
    let v10 = get(y0 + 1, x0);
    let v11 = get(y0 + 1, x0 + 1);

    let top = v00 + fx * (v01 - v00);
    let bottom = v10 + fx * (v11 - v10);
    top + fy * (bottom - top)
}

/// Translate a frame: `out(y, x) = in(y - dy, x - dx)`, zero-filled.
pub fn shift_frame(frame: &ArrayView2<f32>, dy: f32, dx: f32) -> Array2<f32> {
    let (h, w) = frame.dim();
    if dy == 0.0 && dx == 0.0 {
        return frame.to_owned();
    }
    Array2::from_shape_fn((h, w), |(r, c)| bilinear_sample(frame, r as f32 - dy, c as f32 - dx))
}

/// Per-pixel `(dy, dx)` field from block residuals plus the rigid shift.
///
/// Block values are placed at the block centres and bilinearly interpolated;
/// pixels outside the outermost centres take the nearest edge value.
pub fn interpolate_shift_field(
    grid: &BlockGrid,
    block_dy: &ArrayView1<f32>,
    block_dx: &ArrayView1<f32>,
    rigid: &RigidShift,
    ly: usize,
    lx: usize,
) -> (Array2<f32>, Array2<f32>) {
    let row_centers = grid.row_centers();
    let col_centers = grid.col_centers();
    let nx = grid.nx;

    let rows: Vec<(usize, usize, f32)> = (0..ly)
        .map(|r| find_interval(&row_centers, r as f32))
        .collect();
    let cols: Vec<(usize, usize, f32)> = (0..lx)
        .map(|c| find_interval(&col_centers, c as f32))
        .collect();

    let interp = |values: &ArrayView1<f32>, r: usize, c: usize| -> f32 {
        let (ri0, ri1, ty) = rows[r];
        let (ci0, ci1, tx) = cols[c];
        let v00 = values[ri0 * nx + ci0];
        let v01 = values[ri0 * nx + ci1];
        let v10 = values[ri1 * nx + ci0];
        let v11 = values[ri1 * nx + ci1];
        (1.0 - ty) * ((1.0 - tx) * v00 + tx * v01) + ty * ((1.0 - tx) * v10 + tx * v11)
    };

    let field_dy = Array2::from_shape_fn((ly, lx), |(r, c)| rigid.dy + interp(block_dy, r, c));
    let field_dx = Array2::from_shape_fn((ly, lx), |(r, c)| rigid.dx + interp(block_dx, r, c));
    (field_dy, field_dx)
}

/// Find the interval in sorted `positions` containing `value`.
/// Returns (lower_index, upper_index, interpolation_t).
fn find_interval(positions: &[f32], value: f32) -> (usize, usize, f32) {
    let n = positions.len();
    if n <= 1 || value <= positions[0] {
        return (0, 0, 0.0);
    }
    if value >= positions[n - 1] {
        return (n - 1, n - 1, 0.0);
    }

    for i in 0..n - 1 {
        if value >= positions[i] && value <= positions[i + 1] {
            let range = positions[i + 1] - positions[i];
            let t = if range > 1e-6 {
                (value - positions[i]) / range
            } else {
                0.0
            };
            return (i, i + 1, t);
        }
    }

    (n - 1, n - 1, 0.0)
}

/// Resample `frame` through a per-pixel correction field.
pub fn warp_frame(frame: &ArrayView2<f32>, field_dy: &Array2<f32>, field_dx: &Array2<f32>) -> Array2<f32> {
    let (h, w) = frame.dim();
    Array2::from_shape_fn((h, w), |(r, c)| {
        bilinear_sample(frame, r as f32 - field_dy[[r, c]], c as f32 - field_dx[[r, c]])
    })
}

/// Residual block shifts of one frame, with the grid they belong to.
#[derive(Clone, Copy, Debug)]
pub struct BlockField<'a> {
    pub grid: &'a BlockGrid,
    pub dy: ArrayView1<'a, f32>,
    pub dx: ArrayView1<'a, f32>,
}

/// Apply the rigid shift and, when given, the interpolated block residuals in
/// a single resampling of the original frame.
pub fn apply_shifts(frame: &ArrayView2<f32>, rigid: &RigidShift, blocks: Option<BlockField<'_>>) -> Array2<f32> {
    match blocks {
        None => shift_frame(frame, rigid.dy, rigid.dx),
        Some(field) => {
            let (ly, lx) = frame.dim();
            let (fy, fx) = interpolate_shift_field(field.grid, &field.dy, &field.dx, rigid, ly, lx);
            warp_frame(frame, &fy, &fx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_interval_clamps_outside_centres() {
        let pos = [10.0, 20.0, 30.0];
        assert_eq!(find_interval(&pos, 0.0), (0, 0, 0.0));
        assert_eq!(find_interval(&pos, 35.0), (2, 2, 0.0));
        let (lo, hi, t) = find_interval(&pos, 25.0);
        assert_eq!((lo, hi), (1, 2));
        assert!((t - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_integer_shift_moves_content() {
        let mut frame = Array2::<f32>::zeros((8, 8));
        frame[[2, 3]] = 1.0;
        let out = shift_frame(&frame.view(), 2.0, -1.0);
        assert_eq!(out[[4, 2]], 1.0);
        assert_eq!(out.sum(), 1.0);
    }
}
