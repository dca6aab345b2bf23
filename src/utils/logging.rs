//! Logging bootstrap

use tracing_subscriber::EnvFilter;

use crate::error::{SizefitError, SizefitResult};

/// Filter directive for a configured level; `RUST_LOG` wins when set
pub fn build_filter(level: &str) -> SizefitResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| SizefitError::Config(format!("Invalid log level '{}': {}", level, e)))
}

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// `--json` results.
pub fn init_logging(level: &str, json: bool) -> SizefitResult<()> {
    let filter = build_filter(level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| SizefitError::Internal(format!("Logging already initialized: {}", e)))?;

    tracing::debug!(
        "Logging initialized (level: {}, json: {}, version: {})",
        level,
        json,
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}
