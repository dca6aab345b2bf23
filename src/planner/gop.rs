//! Frame rate cap and key-frame (GOP) interval selection

use tracing::debug;

/// Frame rate and GOP rules applied to every plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GopPolicy {
    pub max_frame_rate: u32,
    pub keyframe_interval_seconds: u32,
}

impl Default for GopPolicy {
    fn default() -> Self {
        Self {
            max_frame_rate: 30,
            keyframe_interval_seconds: 2,
        }
    }
}

impl GopPolicy {
    pub fn new(max_frame_rate: u32, keyframe_interval_seconds: u32) -> Self {
        Self {
            max_frame_rate: max_frame_rate.max(1),
            keyframe_interval_seconds: keyframe_interval_seconds.max(1),
        }
    }

    /// `min(max_frame_rate, round(source))`, never below 1.
    ///
    /// Sources that report no usable rate get the cap.
    pub fn output_frame_rate(&self, source_frame_rate: f64) -> u32 {
        if !source_frame_rate.is_finite() || source_frame_rate <= 0.0 {
            debug!(
                "Source frame rate {} unusable, using {}",
                source_frame_rate, self.max_frame_rate
            );
            return self.max_frame_rate;
        }
        let rounded = source_frame_rate.round().max(1.0) as u32;
        rounded.min(self.max_frame_rate)
    }

    /// Frames between key frames at the given output rate
    pub fn keyframe_interval(&self, frame_rate: u32) -> u32 {
        frame_rate.saturating_mul(self.keyframe_interval_seconds)
    }
}
