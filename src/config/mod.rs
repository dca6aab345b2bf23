//! Runtime configuration for budget solving and the transcode pipeline

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SizefitError, SizefitResult};

const MAX_FRAME_RATE_LIMIT: u32 = 240;
const MAX_KEYFRAME_INTERVAL_SECONDS: u32 = 60;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizefitConfig {
    pub budget: BudgetConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

impl SizefitConfig {
    /// Reject settings the solver or pipeline cannot work with
    pub fn validate(&self) -> SizefitResult<()> {
        self.budget.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

/// One rung of the resolution ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderTier {
    /// Longest edge of frames at this tier
    pub max_long_edge: u32,
    /// Bitrate needed to select this tier
    pub min_bitrate_bps: u64,
}

/// Budget solver constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub min_bitrate_bps: u64,
    pub max_bitrate_bps: u64,
    pub audio_bitrate_bps: u64,
    /// HEVC is chosen strictly below this bitrate
    pub hevc_below_bps: u64,
    pub max_frame_rate: u32,
    pub keyframe_interval_seconds: u32,
    pub ladder: Vec<LadderTier>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            min_bitrate_bps: 800_000,
            max_bitrate_bps: 8_000_000,
            audio_bitrate_bps: 128_000,
            hevc_below_bps: 4_000_000,
            max_frame_rate: 30,
            keyframe_interval_seconds: 2,
            ladder: vec![
                LadderTier {
                    max_long_edge: 1920,
                    min_bitrate_bps: 2_000_000,
                },
                LadderTier {
                    max_long_edge: 1280,
                    min_bitrate_bps: 1_000_000,
                },
                LadderTier {
                    max_long_edge: 960,
                    min_bitrate_bps: 600_000,
                },
                LadderTier {
                    max_long_edge: 854,
                    min_bitrate_bps: 0,
                },
            ],
        }
    }
}

impl BudgetConfig {
    pub fn validate(&self) -> SizefitResult<()> {
        if self.min_bitrate_bps == 0 {
            return Err(SizefitError::Config(
                "budget.min_bitrate_bps must be positive".to_string(),
            ));
        }
        if self.min_bitrate_bps > self.max_bitrate_bps {
            return Err(SizefitError::Config(format!(
                "budget.min_bitrate_bps ({}) exceeds budget.max_bitrate_bps ({})",
                self.min_bitrate_bps, self.max_bitrate_bps
            )));
        }
        if self.ladder.is_empty() {
            return Err(SizefitError::Config(
                "budget.ladder needs at least one tier".to_string(),
            ));
        }
        if self.ladder.iter().any(|tier| tier.max_long_edge < 2) {
            return Err(SizefitError::Config(
                "budget.ladder tiers need a long edge of at least 2 pixels".to_string(),
            ));
        }
        if !(1..=MAX_FRAME_RATE_LIMIT).contains(&self.max_frame_rate) {
            return Err(SizefitError::Config(format!(
                "budget.max_frame_rate must be between 1 and {}",
                MAX_FRAME_RATE_LIMIT
            )));
        }
        if !(1..=MAX_KEYFRAME_INTERVAL_SECONDS).contains(&self.keyframe_interval_seconds) {
            return Err(SizefitError::Config(format!(
                "budget.keyframe_interval_seconds must be between 1 and {}",
                MAX_KEYFRAME_INTERVAL_SECONDS
            )));
        }
        Ok(())
    }
}

/// Which encoder family to try before the software fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareAcceleration {
    Auto,
    None,
    VideoToolbox,
    Nvenc,
    Qsv,
    Amf,
    Vaapi,
}

impl FromStr for HardwareAcceleration {
    type Err = SizefitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" | "software" => Ok(Self::None),
            "videotoolbox" => Ok(Self::VideoToolbox),
            "nvenc" => Ok(Self::Nvenc),
            "qsv" => Ok(Self::Qsv),
            "amf" => Ok(Self::Amf),
            "vaapi" => Ok(Self::Vaapi),
            other => Err(SizefitError::Config(format!(
                "Unknown hardware acceleration: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for HardwareAcceleration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::None => "none",
            Self::VideoToolbox => "videotoolbox",
            Self::Nvenc => "nvenc",
            Self::Qsv => "qsv",
            Self::Amf => "amf",
            Self::Vaapi => "vaapi",
        };
        f.write_str(name)
    }
}

/// Transcode pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bounded queue depth between each decode and encode stage
    pub channel_capacity: usize,
    pub hardware_acceleration: HardwareAcceleration,
    /// Directory for outputs when the caller gives no path
    pub temp_dir: Option<PathBuf>,
    /// Allowed overshoot of the byte budget before the verifier warns
    pub budget_tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 8,
            hardware_acceleration: HardwareAcceleration::Auto,
            temp_dir: None,
            budget_tolerance: 0.10,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> SizefitResult<()> {
        if self.channel_capacity == 0 {
            return Err(SizefitError::Config(
                "pipeline.channel_capacity must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.budget_tolerance) {
            return Err(SizefitError::Config(
                "pipeline.budget_tolerance must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory used for generated output names
    pub fn output_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SizefitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.budget.ladder.len(), 4);
        assert_eq!(config.budget.ladder[0].max_long_edge, 1920);
        assert_eq!(config.pipeline.channel_capacity, 8);
    }

    #[test]
    fn test_floor_above_ceiling_rejected() {
        let mut config = SizefitConfig::default();
        config.budget.min_bitrate_bps = 9_000_000;
        assert!(matches!(config.validate(), Err(SizefitError::Config(_))));
    }

    #[test]
    fn test_empty_ladder_and_zero_capacity_rejected() {
        let mut config = SizefitConfig::default();
        config.budget.ladder.clear();
        assert!(config.validate().is_err());

        let mut config = SizefitConfig::default();
        config.pipeline.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gop_settings_are_bounded() {
        let mut config = SizefitConfig::default();
        config.budget.keyframe_interval_seconds = u32::MAX;
        assert!(matches!(config.validate(), Err(SizefitError::Config(_))));

        let mut config = SizefitConfig::default();
        config.budget.max_frame_rate = 100_000;
        assert!(matches!(config.validate(), Err(SizefitError::Config(_))));

        let mut config = SizefitConfig::default();
        config.budget.max_frame_rate = 240;
        config.budget.keyframe_interval_seconds = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_hardware_acceleration_parse() {
        assert_eq!(
            "NVENC".parse::<HardwareAcceleration>().unwrap(),
            HardwareAcceleration::Nvenc
        );
        assert_eq!(
            "software".parse::<HardwareAcceleration>().unwrap(),
            HardwareAcceleration::None
        );
        assert!("quantum".parse::<HardwareAcceleration>().is_err());
        assert_eq!(HardwareAcceleration::VideoToolbox.to_string(), "videotoolbox");
    }
}
