//! Sizefit CLI
//!
//! ```bash
//! sizefit compress --input clip.mov --target-mb 25
//! sizefit plan --input clip.mov --target-mb 8 --start 00:10 --end 00:40
//! sizefit probe --input clip.mov --json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use sizefit::app::DefaultAppContainer;
use sizefit::cli::{commands, Cli, Commands};
use sizefit::config_initialization::initialize_configuration;
use sizefit::utils::init_logging;

/// Main entry point for the Sizefit CLI application
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = initialize_configuration(&cli.config_overrides())
        .context("Failed to load configuration")?;
    init_logging(&config.logging.level, config.logging.json)?;

    info!("Starting Sizefit v{}", env!("CARGO_PKG_VERSION"));

    let container = DefaultAppContainer::new(&config).context("Failed to initialize media backend")?;

    match cli.command {
        Commands::Compress(args) => commands::compress(&container, args).await?,
        Commands::Plan(args) => commands::plan(&container, args).await?,
        Commands::Probe(args) => commands::probe(&container, args).await?,
    }

    Ok(())
}
