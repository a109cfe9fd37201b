use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SteadyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Too few frames: found {found}, need at least {minimum}")]
    TooFewFrames { found: usize, minimum: usize },

    #[error("Invalid block grid: {0}")]
    InvalidBlockGrid(String),

    #[error(
        "Stream {} is truncated: expected at least {expected} bytes, got {actual}",
        path.display()
    )]
    TruncatedStream {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Frame range {start}..{end} out of bounds (total: {total})")]
    FrameRangeOutOfBounds {
        start: usize,
        end: usize,
        total: usize,
    },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Binary stream not found: {}", .0.display())]
    MissingStream(PathBuf),

    #[error("Invalid .npy file: {0}")]
    InvalidNpy(String),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TIFF encoding error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Record serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SteadyError>;
