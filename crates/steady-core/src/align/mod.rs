pub mod bidiphase;
pub mod blocks;
pub mod masks;
pub mod nonrigid;
pub mod phase_correlation;
pub mod reference;
pub mod subpixel;
pub mod warp;

use ndarray::{Array2, ArrayView1};

use crate::frame::{BlockShifts, RigidShift};

use self::bidiphase::apply_bidiphase;
use self::masks::RefAndMasks;
use self::nonrigid::estimate_blocks;
use self::phase_correlation::estimate_rigid;
use self::warp::{apply_shifts, shift_frame, BlockField};

/// Result of registering one frame against a reference.
#[derive(Clone, Debug)]
pub struct FrameRegistration {
    pub corrected: Array2<f32>,
    pub rigid: RigidShift,
    pub blocks: Option<BlockShifts>,
}

/// Estimate and apply the correction for a single frame.
///
/// The optional line-scan correction is applied first; block residuals are
/// measured on the rigidly shifted frame, then rigid and residual shifts are
/// applied together to the (line-corrected) input.
pub fn register_frame(masks: &RefAndMasks, mut frame: Array2<f32>, apply_bidi: bool) -> FrameRegistration {
    if apply_bidi && masks.bidiphase != 0.0 {
        apply_bidiphase(&mut frame.view_mut(), masks.bidiphase);
    }

    let rigid = estimate_rigid(masks, &frame.view());
    let blocks = masks.blocks.as_ref().and_then(|_| {
        let shifted = shift_frame(&frame.view(), rigid.dy, rigid.dx);
        estimate_blocks(masks, &shifted.view())
    });

    let field = match (&masks.blocks, &blocks) {
        (Some(bm), Some(shifts)) => Some(BlockField {
            grid: &bm.grid,
            dy: ArrayView1::from(&shifts.dy[..]),
            dx: ArrayView1::from(&shifts.dx[..]),
        }),
        _ => None,
    };
    let corrected = apply_shifts(&frame.view(), &rigid, field);

    FrameRegistration {
        corrected,
        rigid,
        blocks,
    }
}
