//! Per-batch preview stacks of corrected frames.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ndarray::{ArrayView3, Axis};
use tiff::encoder::{colortype, TiffEncoder};
use tracing::debug;

use crate::error::Result;
use crate::pipeline::config::RegistrationConfig;

use super::binary::to_u16;

/// Which of the two channels a batch of frames belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelRole {
    /// The channel whose correlation produced the shifts.
    Alignment,
    /// The other channel, shifted by replaying the alignment shifts.
    Alternate,
}

/// Receives every corrected batch as it is written.
pub trait PreviewSink {
    fn write_batch(&mut self, role: ChannelRole, batch_index: usize, frames: &ArrayView3<f32>) -> Result<()>;
}

/// Discards all batches.
pub struct NoPreview;

impl PreviewSink for NoPreview {
    fn write_batch(&mut self, _role: ChannelRole, _batch_index: usize, _frames: &ArrayView3<f32>) -> Result<()> {
        Ok(())
    }
}

/// Writes each batch as a multi-page 16-bit TIFF.
///
/// Functional-channel batches go to `save_path/reg_tif`, the other channel's
/// to `save_path/reg_tif_chan2`.
pub struct TiffStackWriter {
    functional_dir: PathBuf,
    other_dir: PathBuf,
    aligns_by_functional: bool,
    functional: bool,
    other: bool,
}

impl TiffStackWriter {
    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self {
            functional_dir: config.preview_dir(true),
            other_dir: config.preview_dir(false),
            aligns_by_functional: config.aligns_by_functional(),
            functional: config.reg_tif,
            other: config.reg_tif_chan2,
        }
    }

    /// Target file for one batch, or `None` when that channel is disabled.
    pub fn batch_path(&self, role: ChannelRole, batch_index: usize) -> Option<PathBuf> {
        let is_functional = (role == ChannelRole::Alignment) == self.aligns_by_functional;
        let (enabled, dir, chan) = if is_functional {
            (self.functional, &self.functional_dir, 0)
        } else {
            (self.other, &self.other_dir, 1)
        };
        enabled.then(|| dir.join(format!("file{batch_index:03}_chan{chan}.tif")))
    }
}

impl PreviewSink for TiffStackWriter {
    fn write_batch(&mut self, role: ChannelRole, batch_index: usize, frames: &ArrayView3<f32>) -> Result<()> {
        let Some(path) = self.batch_path(role, batch_index) else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        write_stack(frames, &path)?;
        debug!("Wrote preview stack {}", path.display());
        Ok(())
    }
}

/// Write a `(n, h, w)` stack as an `n`-page 16-bit grayscale TIFF.
pub fn write_stack(frames: &ArrayView3<f32>, path: &Path) -> Result<()> {
    let (_, h, w) = frames.dim();
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    for frame in frames.axis_iter(Axis(0)) {
        let pixels: Vec<u16> = frame.iter().map(|&v| to_u16(v)).collect();
        encoder.write_image::<colortype::Gray16>(w as u32, h as u32, &pixels)?;
    }
    Ok(())
}
