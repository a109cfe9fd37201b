use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::BYTES_PER_PIXEL;
use crate::error::{Result, SteadyError};

/// All tunables of one registration session.
///
/// Every field has a default, so a TOML file only needs to name what
/// differs (usually `ly`, `lx` and `save_path`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Frame height in pixels.
    pub ly: usize,
    /// Frame width in pixels.
    pub lx: usize,
    /// Frames read, registered and written per streaming step.
    pub batch_size: usize,
    /// Optional cap on the number of frames registered.
    pub frames_include: Option<usize>,
    /// Number of interleaved acquisition channels (1 or 2).
    pub nchannels: usize,
    /// 1-based index of the functional channel.
    pub functional_chan: usize,
    /// 1-based index of the channel whose correlation drives alignment.
    pub align_by_chan: usize,
    /// Enable block-wise (nonrigid) refinement after the rigid estimate.
    pub nonrigid: bool,
    /// Requested block size `[height, width]` for nonrigid registration.
    pub block_size: [usize; 2],
    /// Largest rigid shift as a fraction of the smaller frame dimension.
    pub maxregshift: f32,
    /// Largest residual block shift in pixels.
    pub maxregshift_nr: usize,
    /// Gaussian smoothing (pixels) applied to the reference spectrum.
    pub smooth_sigma: f32,
    /// Peak-to-sidelobe ratio below which a block borrows from its neighbours.
    pub snr_thresh: f32,
    /// Width (in block units) of the neighbour smoothing kernel.
    pub block_smooth_sigma: f32,
    /// Maximum number of neighbour smoothing passes for low-SNR blocks.
    pub block_smooth_passes: usize,
    /// Frames sampled for the reference image.
    pub nimg_init: usize,
    /// Estimate the bidirectional scan phase from the reference sample.
    pub do_bidiphase: bool,
    /// User-fixed bidiphase; a non-zero value disables estimation.
    pub bidiphase: f32,
    /// Sensitivity of automatic bad-frame flagging.
    pub th_badframes: f32,
    /// Keep the unregistered stream and prefer it on the first pass.
    pub keep_movie_raw: bool,
    /// Write per-batch preview stacks of the alignment channel.
    pub reg_tif: bool,
    /// Write per-batch preview stacks of the alternate channel.
    pub reg_tif_chan2: bool,
    /// Directory holding the binary streams and preview stacks.
    pub save_path: PathBuf,
    /// Acquisition directories; the first may hold `bad_frames.npy`.
    pub data_path: Vec<PathBuf>,
    pub reg_file: Option<PathBuf>,
    pub reg_file_chan2: Option<PathBuf>,
    pub raw_file: Option<PathBuf>,
    pub raw_file_chan2: Option<PathBuf>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            ly: 512,
            lx: 512,
            batch_size: 500,
            frames_include: None,
            nchannels: 1,
            functional_chan: 1,
            align_by_chan: 1,
            nonrigid: true,
            block_size: [128, 128],
            maxregshift: 0.1,
            maxregshift_nr: 5,
            smooth_sigma: 1.15,
            snr_thresh: 1.2,
            block_smooth_sigma: 1.0,
            block_smooth_passes: 2,
            nimg_init: 300,
            do_bidiphase: false,
            bidiphase: 0.0,
            th_badframes: 1.0,
            keep_movie_raw: false,
            reg_tif: false,
            reg_tif_chan2: false,
            save_path: PathBuf::from("."),
            data_path: Vec::new(),
            reg_file: None,
            reg_file_chan2: None,
            raw_file: None,
            raw_file_chan2: None,
        }
    }
}

impl RegistrationConfig {
    /// Reject configurations that cannot describe a registration run.
    pub fn validate(&self) -> Result<()> {
        if self.ly == 0 || self.lx == 0 {
            return Err(SteadyError::InvalidDimensions {
                width: self.lx,
                height: self.ly,
            });
        }
        if self.batch_size == 0 {
            return Err(SteadyError::InvalidConfig("batch_size must be > 0".into()));
        }
        if !(1..=2).contains(&self.nchannels) {
            return Err(SteadyError::InvalidConfig(format!(
                "nchannels must be 1 or 2, got {}",
                self.nchannels
            )));
        }
        for (name, chan) in [
            ("functional_chan", self.functional_chan),
            ("align_by_chan", self.align_by_chan),
        ] {
            if chan == 0 || chan > self.nchannels {
                return Err(SteadyError::InvalidConfig(format!(
                    "{name} = {chan} is outside 1..={}",
                    self.nchannels
                )));
            }
        }
        if self.maxregshift <= 0.0 || self.maxregshift > 0.5 || self.maxregshift.is_nan() {
            return Err(SteadyError::InvalidConfig(format!(
                "maxregshift must be in (0, 0.5], got {}",
                self.maxregshift
            )));
        }
        if self.smooth_sigma <= 0.0 || self.block_smooth_sigma <= 0.0 {
            return Err(SteadyError::InvalidConfig(
                "smoothing widths must be positive".into(),
            ));
        }
        if self.frames_include == Some(0) {
            return Err(SteadyError::InvalidConfig(
                "frames_include must be > 0 when set".into(),
            ));
        }
        Ok(())
    }

    /// Bytes occupied by one frame in a binary stream.
    pub fn frame_bytes(&self) -> usize {
        self.ly * self.lx * BYTES_PER_PIXEL
    }

    /// True when the functional channel is also the alignment channel.
    pub fn aligns_by_functional(&self) -> bool {
        self.functional_chan == self.align_by_chan
    }

    pub fn reg_file_path(&self) -> PathBuf {
        self.reg_file
            .clone()
            .unwrap_or_else(|| self.save_path.join("data.bin"))
    }

    pub fn reg_file_chan2_path(&self) -> PathBuf {
        self.reg_file_chan2
            .clone()
            .unwrap_or_else(|| self.save_path.join("data_chan2.bin"))
    }

    pub fn raw_file_path(&self) -> PathBuf {
        self.raw_file
            .clone()
            .unwrap_or_else(|| self.save_path.join("data_raw.bin"))
    }

    pub fn raw_file_chan2_path(&self) -> PathBuf {
        self.raw_file_chan2
            .clone()
            .unwrap_or_else(|| self.save_path.join("data_chan2_raw.bin"))
    }

    /// Location of the optional external bad-frame index file.
    pub fn bad_frames_path(&self) -> Option<PathBuf> {
        self.data_path
            .first()
            .map(|dir| dir.join(crate::consts::BAD_FRAMES_FILE))
    }

    /// Directory that receives preview stacks for one channel role.
    pub fn preview_dir(&self, functional: bool) -> PathBuf {
        if functional {
            self.save_path.join("reg_tif")
        } else {
            self.save_path.join("reg_tif_chan2")
        }
    }
}
