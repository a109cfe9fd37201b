/// Bytes per pixel in the binary frame streams (little-endian `u16`).
pub const BYTES_PER_PIXEL: usize = 2;

/// A session with fewer frames than this is rejected.
pub const MIN_FRAMES: usize = 50;

/// Below this frame count registration still runs but results are unreliable.
pub const RECOMMENDED_MIN_FRAMES: usize = 200;

/// Smallest block edge (pixels) that still yields a usable correlation surface.
pub const MIN_BLOCK_SIZE: usize = 16;

/// Blocks per axis are `ceil(BLOCK_OVERLAP_FACTOR * L / block_size)`.
pub const BLOCK_OVERLAP_FACTOR: f64 = 1.5;

/// Pixels kept around the nonrigid search window so the peak always has neighbours.
pub const NONRIGID_PAD: usize = 3;

/// Largest bidiphase (pixels) searched for in either direction.
pub const BIDIPHASE_MAX_SHIFT: usize = 10;

/// Frames used to seed the initial reference average.
pub const REFERENCE_SEED_FRAMES: usize = 20;

/// Refinement passes when iterating the reference image.
pub const REFERENCE_ITERATIONS: usize = 8;

/// Spatial taper slope, in units of `smooth_sigma`, for the whole frame.
pub const FRAME_TAPER_SLOPE: f32 = 3.0;

/// Spatial taper slope, in units of `smooth_sigma`, for a single block.
pub const BLOCK_TAPER_SLOPE: f32 = 2.0;

/// Added to spectrum magnitudes before phase normalization.
pub const SPECTRUM_EPSILON: f32 = 1e-5;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// Minimum frame count to use frame-level Rayon parallelism within a batch.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// Largest median-filter window used when flagging bad frames.
pub const BADFRAME_FILTER_WINDOW: usize = 101;

/// Fraction of the maximum allowed shift beyond which a frame is flagged.
pub const BADFRAME_SHIFT_FRACTION: f32 = 0.95;

/// A crop with fewer rows or columns than this is reported as degenerate.
pub const MIN_CROP_EXTENT: usize = 8;

/// Batches between progress log lines.
pub const PROGRESS_LOG_INTERVAL: usize = 5;

/// File name of the optional bad-frame index file inside the first data path.
pub const BAD_FRAMES_FILE: &str = "bad_frames.npy";
