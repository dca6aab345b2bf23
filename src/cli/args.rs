//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

use crate::config::HardwareAcceleration;

fn parse_target_mb(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err("target size must be a positive number of megabytes".to_string())
    }
}

fn parse_capacity(s: &str) -> Result<usize, String> {
    clap_num::number_range(s, 1, 1024)
}

fn parse_acceleration(s: &str) -> Result<HardwareAcceleration, String> {
    s.parse().map_err(|e: crate::error::SizefitError| e.to_string())
}

/// Arguments for the compress command
#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Target output size in megabytes (1 MB = 1024 * 1024 bytes)
    #[arg(short, long, value_parser = parse_target_mb)]
    pub target_mb: f64,

    /// Output file path (default: new file in the temp directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Trim start (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub start: Option<String>,

    /// Trim end (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub end: Option<String>,

    /// Keep the source resolution, spend the budget on bitrate only
    #[arg(long)]
    pub preserve_resolution: bool,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Hardware encoder family to try first
    #[arg(long, value_parser = parse_acceleration)]
    pub hw_accel: Option<HardwareAcceleration>,

    /// Directory for generated output files
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Frames buffered between decode and encode stages
    #[arg(long, value_parser = parse_capacity)]
    pub channel_capacity: Option<usize>,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Target output size in megabytes
    #[arg(short, long, value_parser = parse_target_mb)]
    pub target_mb: f64,

    /// Trim start
    #[arg(short, long)]
    pub start: Option<String>,

    /// Trim end
    #[arg(short, long)]
    pub end: Option<String>,

    #[arg(long)]
    pub preserve_resolution: bool,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
