//! Configuration initialization and hierarchy management

use std::path::PathBuf;

use tracing::{debug, info};

use crate::adapters::TomlConfigAdapter;
use crate::config::{HardwareAcceleration, SizefitConfig};
use crate::error::{SizefitError, SizefitResult};

/// Values given on the command line; `None` leaves the lower layers alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub json_logs: bool,
    pub hardware_acceleration: Option<HardwareAcceleration>,
    pub temp_dir: Option<PathBuf>,
    pub channel_capacity: Option<usize>,
}

/// Build the configuration following precedence: CLI > Env > File > Defaults
pub fn initialize_configuration(overrides: &ConfigOverrides) -> SizefitResult<SizefitConfig> {
    let adapter = TomlConfigAdapter::new(overrides.config_file.clone());
    let mut config = adapter.load()?;

    let applied = apply_environment(&mut config, |key| std::env::var(key).ok())?;
    if applied > 0 {
        info!("Applied {} environment variable overrides", applied);
    }

    let applied = apply_cli_overrides(&mut config, overrides);
    if applied > 0 {
        info!("Applied {} CLI configuration overrides", applied);
    }

    config.validate()?;
    Ok(config)
}

/// Overlay `SIZEFIT_*` variables; returns how many were applied
pub fn apply_environment<F>(config: &mut SizefitConfig, lookup: F) -> SizefitResult<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = 0;
    let mut found = |key: &str| {
        let value = lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(value) = &value {
            debug!("Found environment override: {} = {}", key, value);
            applied += 1;
        }
        value
    };

    if let Some(level) = found("SIZEFIT_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = found("SIZEFIT_JSON_LOGS") {
        config.logging.json = parse_env("SIZEFIT_JSON_LOGS", &json, parse_bool)?;
    }
    if let Some(accel) = found("SIZEFIT_HARDWARE_ACCELERATION") {
        config.pipeline.hardware_acceleration = accel.parse()?;
    }
    if let Some(dir) = found("SIZEFIT_TEMP_DIR") {
        config.pipeline.temp_dir = Some(PathBuf::from(dir));
    }
    if let Some(capacity) = found("SIZEFIT_CHANNEL_CAPACITY") {
        config.pipeline.channel_capacity =
            parse_env("SIZEFIT_CHANNEL_CAPACITY", &capacity, |v| v.parse().ok())?;
    }
    if let Some(tolerance) = found("SIZEFIT_BUDGET_TOLERANCE") {
        config.pipeline.budget_tolerance =
            parse_env("SIZEFIT_BUDGET_TOLERANCE", &tolerance, |v| v.parse().ok())?;
    }
    if let Some(floor) = found("SIZEFIT_MIN_BITRATE_BPS") {
        config.budget.min_bitrate_bps =
            parse_env("SIZEFIT_MIN_BITRATE_BPS", &floor, |v| v.parse().ok())?;
    }
    if let Some(ceiling) = found("SIZEFIT_MAX_BITRATE_BPS") {
        config.budget.max_bitrate_bps =
            parse_env("SIZEFIT_MAX_BITRATE_BPS", &ceiling, |v| v.parse().ok())?;
    }

    Ok(applied)
}

/// Overlay command line values; returns how many were applied
pub fn apply_cli_overrides(config: &mut SizefitConfig, overrides: &ConfigOverrides) -> usize {
    let mut applied = 0;

    if let Some(level) = &overrides.log_level {
        config.logging.level = level.clone();
        applied += 1;
    }
    if overrides.json_logs {
        config.logging.json = true;
        applied += 1;
    }
    if let Some(accel) = overrides.hardware_acceleration {
        config.pipeline.hardware_acceleration = accel;
        applied += 1;
    }
    if let Some(dir) = &overrides.temp_dir {
        config.pipeline.temp_dir = Some(dir.clone());
        applied += 1;
    }
    if let Some(capacity) = overrides.channel_capacity {
        config.pipeline.channel_capacity = capacity;
        applied += 1;
    }

    applied
}

fn parse_env<T>(key: &str, value: &str, parse: impl Fn(&str) -> Option<T>) -> SizefitResult<T> {
    parse(value.trim()).ok_or_else(|| {
        SizefitError::Config(format!("Invalid value for {}: {}", key, value))
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = SizefitConfig::default();
        let applied = apply_environment(
            &mut config,
            env(&[
                ("SIZEFIT_LOG_LEVEL", "debug"),
                ("SIZEFIT_JSON_LOGS", "yes"),
                ("SIZEFIT_HARDWARE_ACCELERATION", "none"),
                ("SIZEFIT_CHANNEL_CAPACITY", "16"),
                ("SIZEFIT_MAX_BITRATE_BPS", "5000000"),
            ]),
        )
        .unwrap();

        assert_eq!(applied, 5);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.pipeline.hardware_acceleration, HardwareAcceleration::None);
        assert_eq!(config.pipeline.channel_capacity, 16);
        assert_eq!(config.budget.max_bitrate_bps, 5_000_000);
    }

    #[test]
    fn test_blank_variables_are_ignored() {
        let mut config = SizefitConfig::default();
        let applied = apply_environment(&mut config, env(&[("SIZEFIT_TEMP_DIR", "  ")])).unwrap();
        assert_eq!(applied, 0);
        assert_eq!(config.pipeline.temp_dir, None);
    }

    #[test]
    fn test_unparseable_environment_value() {
        let mut config = SizefitConfig::default();
        let result = apply_environment(
            &mut config,
            env(&[("SIZEFIT_CHANNEL_CAPACITY", "lots")]),
        );
        assert!(matches!(result, Err(SizefitError::Config(_))));
    }

    #[test]
    fn test_cli_wins_over_environment() {
        let mut config = SizefitConfig::default();
        apply_environment(
            &mut config,
            env(&[
                ("SIZEFIT_LOG_LEVEL", "warn"),
                ("SIZEFIT_HARDWARE_ACCELERATION", "qsv"),
            ]),
        )
        .unwrap();

        let overrides = ConfigOverrides {
            log_level: Some("trace".to_string()),
            hardware_acceleration: Some(HardwareAcceleration::Nvenc),
            ..Default::default()
        };
        assert_eq!(apply_cli_overrides(&mut config, &overrides), 2);
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.pipeline.hardware_acceleration, HardwareAcceleration::Nvenc);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let overrides = ConfigOverrides {
            config_file: Some(PathBuf::from("/definitely/missing/sizefit.toml")),
            ..Default::default()
        };
        assert!(initialize_configuration(&overrides).is_err());
    }
}
