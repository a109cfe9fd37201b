use ndarray::{Array1, Array2, Array3, ArrayView3, Axis};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::consts::{PARALLEL_FRAME_THRESHOLD, REFERENCE_ITERATIONS, REFERENCE_SEED_FRAMES};
use crate::error::{Result, SteadyError};
use crate::frame::RigidShift;
use crate::io::binary::BinaryMovie;
use crate::pipeline::config::RegistrationConfig;

use super::bidiphase::{apply_bidiphase, estimate_bidiphase};
use super::masks::prepare_masks;
use super::phase_correlation::estimate_rigid;
use super::warp::shift_frame;

/// Reference image and the line-scan correction found while building it.
#[derive(Clone, Debug)]
pub struct ReferenceImage {
    pub image: Array2<f32>,
    pub bidiphase: f32,
}

/// Evenly spaced sample of `min(nimg_init, nframes)` frame indices,
/// starting at frame 0.
pub fn sample_indices(nframes: usize, nimg_init: usize) -> Vec<usize> {
    let n = nimg_init.min(nframes);
    (0..n)
        .map(|i| (i as f64 * nframes as f64 / n as f64) as usize)
        .collect()
}

/// Read the reference sample of a stream into a `(n, Ly, Lx)` stack.
pub fn read_sample(movie: &BinaryMovie, nframes: usize, nimg_init: usize) -> Result<Array3<f32>> {
    let indices = sample_indices(nframes, nimg_init);
    let (ly, lx) = (movie.ly(), movie.lx());
    let mut sample = Array3::<f32>::zeros((indices.len(), ly, lx));
    for (slot, &index) in indices.iter().enumerate() {
        let frame = movie.read_frame(index)?;
        sample.index_axis_mut(Axis(0), slot).assign(&frame);
    }
    Ok(sample)
}

/// Build the reference image from the first `nframes` frames of `movie`.
pub fn build_reference(
    movie: &BinaryMovie,
    nframes: usize,
    config: &RegistrationConfig,
    bidi_corrected: bool,
) -> Result<ReferenceImage> {
    let sample = read_sample(movie, nframes, config.nimg_init)?;
    info!(
        "Building reference image from {} of {} frames",
        sample.len_of(Axis(0)),
        nframes
    );
    compute_reference(sample, config, bidi_corrected)
}

/// Build a reference image from a sample stack.
///
/// When requested and not yet applied, the line-scan offset is estimated on
/// the sample and corrected before any correlation.
pub fn compute_reference(
    mut sample: Array3<f32>,
    config: &RegistrationConfig,
    bidi_corrected: bool,
) -> Result<ReferenceImage> {
    let bidiphase = if config.do_bidiphase && config.bidiphase == 0.0 && !bidi_corrected {
        let estimate = estimate_bidiphase(&sample.view());
        info!("Estimated bidiphase offset: {:.2} px", estimate);
        estimate
    } else {
        config.bidiphase
    };

    if bidiphase != 0.0 && !bidi_corrected {
        for mut frame in sample.axis_iter_mut(Axis(0)) {
            apply_bidiphase(&mut frame, bidiphase);
        }
    }

    let initial = pick_initial_reference(&sample.view())?;
    let image = refine_reference(&sample.view(), initial, config)?;
    Ok(ReferenceImage { image, bidiphase })
}

/// Seed reference: the mean of the frames most correlated with the frame
/// that is, on average, most correlated with its closest neighbours.
pub fn pick_initial_reference(frames: &ArrayView3<f32>) -> Result<Array2<f32>> {
    let (n, ly, lx) = frames.dim();
    if n == 0 {
        return Err(SteadyError::InvalidConfig(
            "reference sample contains no frames".into(),
        ));
    }

    let mut flat = frames
        .to_owned()
        .into_shape_with_order((n, ly * lx))
        .map_err(|_| SteadyError::ShapeMismatch {
            expected: vec![n, ly * lx],
            actual: vec![n, ly, lx],
        })?;
    for mut row in flat.rows_mut() {
        let mean = row.mean().unwrap_or(0.0);
        row.mapv_inplace(|v| v - mean);
    }

    let mut cc = flat.dot(&flat.t());
    let norms: Array1<f32> = cc.diag().mapv(|v| v.max(f32::MIN_POSITIVE).sqrt());
    for ((i, j), v) in cc.indexed_iter_mut() {
        *v /= norms[i] * norms[j];
    }

    let top = REFERENCE_SEED_FRAMES.min(n);
    let ranked = |i: usize| -> Vec<usize> {
        let row = cc.row(i);
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
        order
    };

    let mut best_frame = 0;
    let mut best_score = f32::NEG_INFINITY;
    for i in 0..n {
        let order = ranked(i);
        let neighbours = &order[1..top];
        let score = if neighbours.is_empty() {
            0.0
        } else {
            neighbours.iter().map(|&j| cc[[i, j]]).sum::<f32>() / neighbours.len() as f32
        };
        if score > best_score {
            best_score = score;
            best_frame = i;
        }
    }
    debug!("Seed reference frame {} (mean top correlation {:.3})", best_frame, best_score);

    let chosen = ranked(best_frame);
    let mut seed = Array2::<f32>::zeros((ly, lx));
    for &j in &chosen[..top] {
        seed += &frames.index_axis(Axis(0), j);
    }
    seed /= top as f32;
    Ok(seed)
}

/// Iteratively register the sample to the current reference and rebuild the
/// reference from a growing set of best-matching frames.
pub fn refine_reference(
    frames: &ArrayView3<f32>,
    initial: Array2<f32>,
    config: &RegistrationConfig,
) -> Result<Array2<f32>> {
    let n = frames.len_of(Axis(0));
    let originals: Vec<Array2<f32>> = frames.outer_iter().map(|f| f.to_owned()).collect();
    let mut reference = initial;
    if n < 2 {
        return Ok(reference);
    }

    for iter in 0..REFERENCE_ITERATIONS {
        let masks = prepare_masks(&reference, 0.0, config, None)?;
        let align = |frame: &Array2<f32>| -> (RigidShift, Array2<f32>) {
            let shift = estimate_rigid(&masks, &frame.view());
            let aligned = shift_frame(&frame.view(), shift.dy.round(), shift.dx.round());
            (shift, aligned)
        };
        let results: Vec<(RigidShift, Array2<f32>)> = if n >= PARALLEL_FRAME_THRESHOLD {
            originals.par_iter().map(align).collect()
        } else {
            originals.iter().map(align).collect()
        };

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| results[b].0.corr.total_cmp(&results[a].0.corr));
        let nmax = (n * (1 + iter) / (2 * REFERENCE_ITERATIONS)).max(2);
        let chosen = &order[1..nmax.min(n)];

        let mut next = Array2::<f32>::zeros(reference.dim());
        let (mut mean_dy, mut mean_dx) = (0.0f32, 0.0f32);
        for &i in chosen {
            next += &results[i].1;
            mean_dy += results[i].0.dy;
            mean_dx += results[i].0.dx;
        }
        let count = chosen.len() as f32;
        next /= count;
        mean_dy /= count;
        mean_dx /= count;

        // Re-centre on the average position of the chosen frames.
        reference = shift_frame(&next.view(), -mean_dy.round(), -mean_dx.round());
        debug!(
            "Reference iteration {}: {} frames, mean shift ({:.2}, {:.2})",
            iter + 1,
            chosen.len(),
            mean_dy,
            mean_dx
        );
    }

    Ok(reference)
}
