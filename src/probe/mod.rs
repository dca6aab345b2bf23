//! Media inspection: raw container metadata to [`SourceAnalysis`]
//!
//! [`SourceAnalysis`]: crate::domain::model::SourceAnalysis

use serde::{Deserialize, Serialize};

pub mod inspector;

pub use inspector::MediaInspector;

/// Container-level facts read by a probe backend, before any interpretation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMediaMetadata {
    /// Container format name
    pub format: String,
    /// Size of the file on disk
    pub file_size_bytes: u64,
    /// Container duration, falling back to the video stream's duration
    pub duration_seconds: Option<f64>,
    /// Bitrate the container claims
    pub stated_bitrate_bps: Option<u64>,
    /// Best video stream, if any
    pub video: Option<RawVideoTrack>,
    pub has_audio: bool,
}

/// Video stream facts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawVideoTrack {
    pub codec: String,
    /// Decoded buffer width
    pub width: u32,
    /// Decoded buffer height
    pub height: u32,
    pub average_frame_rate: Option<f64>,
    pub base_frame_rate: Option<f64>,
    /// Display matrix side data (3x3, 16.16 fixed point)
    pub display_matrix: Option<[i32; 9]>,
    /// Clockwise degrees from a `rotate` metadata tag
    pub rotation_tag: Option<f64>,
}
