//! CLI module for Sizefit
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config_initialization::ConfigOverrides;

pub mod args;
pub mod commands;

pub use args::{CompressArgs, PlanArgs, ProbeArgs};

/// Sizefit target-size video compressor
///
/// Fits a video into a byte budget in a single pass, picking bitrate,
/// resolution, frame rate and codec from the budget.
#[derive(Parser, Debug)]
#[command(name = "sizefit")]
#[command(about = "Sizefit - Compress a video to fit a target file size")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./sizefit.toml when present)
    #[arg(long, global = true, env = "SIZEFIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compress a video to fit a target size
    Compress(CompressArgs),
    /// Show the encoding plan without writing anything
    Plan(PlanArgs),
    /// Inspect video file information
    Probe(ProbeArgs),
}

impl Cli {
    /// Configuration values given on the command line
    pub fn config_overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            config_file: self.config.clone(),
            log_level: self.log_level.clone(),
            json_logs: self.json_logs,
            ..Default::default()
        };
        if let Commands::Compress(args) = &self.command {
            overrides.hardware_acceleration = args.hw_accel;
            overrides.temp_dir = args.temp_dir.clone();
            overrides.channel_capacity = args.channel_capacity;
        }
        overrides
    }
}
