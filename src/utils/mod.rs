//! Common utilities and helpers

pub mod logging;
pub mod time;

pub use logging::init_logging;
pub use time::TimeParser;

/// Format a duration in seconds for display
pub fn format_duration(seconds: f64) -> String {
    TimeParser::new().format_time(seconds)
}

/// Format file size for display
pub fn format_file_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut scaled = size as f64;
    let mut unit_index = 0;

    while scaled >= 1024.0 && unit_index < UNITS.len() - 1 {
        scaled /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size, UNITS[0])
    } else {
        format!("{:.2} {}", scaled, UNITS[unit_index])
    }
}
