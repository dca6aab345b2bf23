//! Sizefit Target-Size Video Compressor Library
//!
//! Fits a video into a caller-supplied byte budget in a single encoding pass.
//! The source is probed, a bitrate, resolution, frame rate and codec are
//! derived from the budget, and the video is re-encoded with its display
//! orientation baked into the pixels.
//!
//! # Usage
//!
//! ```no_run
//! use sizefit::app::{AppContainer, DefaultAppContainer};
//! use sizefit::config::SizefitConfig;
//! use sizefit::domain::model::CompressRequest;
//! use sizefit::engine::{CancellationToken, ProgressTracker};
//!
//! # async fn run() -> sizefit::SizefitResult<()> {
//! let container = DefaultAppContainer::new(&SizefitConfig::default())?;
//! let request = CompressRequest::new("clip.mov", 25 * 1024 * 1024);
//! let result = container
//!     .compressor()
//!     .compress(request, &ProgressTracker::new(), &CancellationToken::new())
//!     .await?;
//! println!("{} bytes at {}", result.compressed_size_bytes, result.output_path.display());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod output;
pub mod planner;
pub mod ports;
pub mod probe;
pub mod utils;

// Re-export commonly used types
pub use app::{Compressor, PlanPreview};
pub use config::SizefitConfig;
pub use domain::model::{CompressRequest, CompressionResult, SourceAnalysis, TrimRange};
pub use engine::{CancellationToken, PipelineState, ProgressCallback, ProgressTracker};
pub use error::{SizefitError, SizefitResult};
