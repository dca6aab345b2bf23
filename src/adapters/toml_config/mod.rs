// TOML config adapter - Configuration management using TOML files

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::SizefitConfig;
use crate::error::{SizefitError, SizefitResult};

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "sizefit.toml";

/// TOML configuration adapter
#[derive(Debug, Clone, Default)]
pub struct TomlConfigAdapter {
    explicit_path: Option<PathBuf>,
}

impl TomlConfigAdapter {
    /// Create new TOML config adapter; `explicit_path` must exist when given
    pub fn new(explicit_path: Option<PathBuf>) -> Self {
        Self { explicit_path }
    }

    /// File to load: the explicit path, else `sizefit.toml` if present
    pub fn config_file_path(&self) -> Option<PathBuf> {
        match &self.explicit_path {
            Some(path) => Some(path.clone()),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                fallback.is_file().then_some(fallback)
            }
        }
    }

    /// Defaults overlaid with the config file, if any
    pub fn load(&self) -> SizefitResult<SizefitConfig> {
        match self.config_file_path() {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_file(&path)
            }
            None => {
                debug!("No configuration file, using defaults");
                Ok(SizefitConfig::default())
            }
        }
    }

    pub fn load_file(path: &Path) -> SizefitResult<SizefitConfig> {
        if !path.is_file() {
            return Err(SizefitError::Config(format!(
                "Config file does not exist: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            SizefitError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Deserialize config from TOML string; missing keys keep their defaults
    pub fn parse(toml_content: &str) -> SizefitResult<SizefitConfig> {
        toml::from_str(toml_content)
            .map_err(|e| SizefitError::Config(format!("Failed to parse TOML config: {}", e)))
    }

    /// Serialize config to TOML string
    pub fn serialize(config: &SizefitConfig) -> SizefitResult<String> {
        toml::to_string_pretty(config)
            .map_err(|e| SizefitError::Config(format!("Failed to serialize config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HardwareAcceleration;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TomlConfigAdapter::parse(
            r#"
            [budget]
            max_bitrate_bps = 6000000

            [pipeline]
            hardware_acceleration = "nvenc"
            "#,
        )
        .unwrap();
        assert_eq!(config.budget.max_bitrate_bps, 6_000_000);
        assert_eq!(config.budget.min_bitrate_bps, 800_000);
        assert_eq!(config.pipeline.hardware_acceleration, HardwareAcceleration::Nvenc);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_custom_ladder() {
        let config = TomlConfigAdapter::parse(
            r#"
            [[budget.ladder]]
            max_long_edge = 1280
            min_bitrate_bps = 1500000

            [[budget.ladder]]
            max_long_edge = 640
            min_bitrate_bps = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.budget.ladder.len(), 2);
        assert_eq!(config.budget.ladder[1].max_long_edge, 640);
    }

    #[test]
    fn test_malformed_and_missing_files() {
        assert!(matches!(
            TomlConfigAdapter::parse("[budget\nmax = "),
            Err(SizefitError::Config(_))
        ));

        let adapter = TomlConfigAdapter::new(Some(PathBuf::from("/no/such/sizefit.toml")));
        assert!(matches!(adapter.load(), Err(SizefitError::Config(_))));
    }

    #[test]
    fn test_serialized_defaults_load_back() {
        let text = TomlConfigAdapter::serialize(&SizefitConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sizefit.toml");
        std::fs::write(&path, text).unwrap();

        let loaded = TomlConfigAdapter::new(Some(path)).load().unwrap();
        assert_eq!(loaded, SizefitConfig::default());
    }
}
