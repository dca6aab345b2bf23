// Adapters - External system implementations

pub mod exec_libav;
pub mod probe_libav;
pub mod toml_config;

use std::sync::OnceLock;

use tracing::debug;

use crate::error::{SizefitError, SizefitResult};

// Re-export adapters
pub use exec_libav::LibavBackend;
pub use probe_libav::LibavProbeAdapter;
pub use toml_config::TomlConfigAdapter;

static LIBAV_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize libav once per process; later calls return the first outcome
pub(crate) fn init_libav() -> SizefitResult<()> {
    LIBAV_INIT
        .get_or_init(|| {
            debug!("Initializing libav");
            ffmpeg_next::init().map_err(|e| e.to_string())?;
            ffmpeg_next::log::set_level(ffmpeg_next::log::Level::Error);
            Ok(())
        })
        .clone()
        .map_err(|message| SizefitError::FfmpegInit { message })
}
