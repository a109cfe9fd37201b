//! Session state carried across registration runs on the same data.

use std::path::PathBuf;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::align::blocks::BlockGrid;
use crate::frame::OffsetHistory;

use super::config::RegistrationConfig;
use super::crop::CropRect;

/// Which physical stream holds the authoritative frames of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovieSource {
    /// Nothing registered yet; a preserved raw stream may be read.
    #[default]
    Raw,
    /// At least one pass completed; the registered stream is authoritative.
    Registered,
}

/// Persistent outcome of a registration run, extended by later runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub config: RegistrationConfig,
    pub ly: usize,
    pub lx: usize,
    pub nframes: usize,
    pub movie_source: MovieSource,
    /// The registered streams already carry the line-scan correction.
    pub bidi_corrected: bool,
    pub bidiphase: f32,
    pub ref_img: Array2<f32>,
    /// Mean of the functional channel.
    pub mean_img: Array2<f32>,
    /// Mean of the non-functional channel, for two-channel sessions.
    pub mean_img_chan2: Option<Array2<f32>>,
    pub blocks: Option<BlockGrid>,
    pub offsets: OffsetHistory,
    pub badframes: Vec<bool>,
    pub crop: CropRect,
}

impl SessionRecord {
    pub fn bad_frame_count(&self) -> usize {
        self.badframes.iter().filter(|&&b| b).count()
    }
}

/// Input and output file of one channel for a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPaths {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ChannelPaths {
    pub fn is_in_place(&self) -> bool {
        self.input == self.output
    }
}

/// Physical streams used by one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamPlan {
    pub source: MovieSource,
    pub alignment: ChannelPaths,
    pub alternate: Option<ChannelPaths>,
}

/// Decide which streams serve as alignment and alternate channel.
///
/// Raw streams are read only while the session has not been registered
/// yet, when the caller asks for them, `keep_movie_raw` is set and the raw
/// alignment file exists. Otherwise the registered streams are rewritten in
/// place.
pub fn plan_streams(config: &RegistrationConfig, state: MovieSource, prefer_raw: bool) -> StreamPlan {
    let (align_reg, align_raw, alt_reg, alt_raw) = if config.aligns_by_functional() {
        (
            config.reg_file_path(),
            config.raw_file_path(),
            config.reg_file_chan2_path(),
            config.raw_file_chan2_path(),
        )
    } else {
        (
            config.reg_file_chan2_path(),
            config.raw_file_chan2_path(),
            config.reg_file_path(),
            config.raw_file_path(),
        )
    };

    let use_raw = prefer_raw && config.keep_movie_raw && state == MovieSource::Raw && align_raw.exists();
    let source = if use_raw {
        MovieSource::Raw
    } else {
        MovieSource::Registered
    };
    let channel = |reg: PathBuf, raw: PathBuf| ChannelPaths {
        input: if use_raw { raw } else { reg.clone() },
        output: reg,
    };

    StreamPlan {
        source,
        alignment: channel(align_reg, align_raw),
        alternate: (config.nchannels > 1).then(|| channel(alt_reg, alt_raw)),
    }
}
