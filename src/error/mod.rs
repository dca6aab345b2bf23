//! Error handling module for Sizefit

use thiserror::Error;

/// Main error type for Sizefit operations
#[derive(Error, Debug)]
pub enum SizefitError {
    /// Source has no decodable video stream
    #[error("No video track found in source")]
    NoVideoTrack,

    /// Demuxer or decoder failure
    #[error("Read error: {0}")]
    Read(String),

    /// Encoder or muxer failure
    #[error("Write error: {0}")]
    Write(String),

    /// Caller-initiated cancellation
    #[error("Compression cancelled")]
    Cancelled,

    /// Input file not found or inaccessible
    #[error("Source file not found: {path}")]
    SourceNotFound { path: String },

    /// Request arguments that can never succeed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// FFmpeg initialization error
    #[error("Failed to initialize FFmpeg: {message}")]
    FfmpegInit { message: String },

    /// Broken internal invariant (lane panicked, poisoned lock)
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SizefitError {
    /// Whether the error came from the caller cancelling the call
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SizefitError::Cancelled)
    }

    /// Errors that end the call. Everything except cancellation; the core
    /// never retries, so this only separates "failed" from "stopped".
    pub fn is_fatal(&self) -> bool {
        !self.is_cancellation()
    }

    pub(crate) fn read(context: &str, err: impl std::fmt::Display) -> Self {
        SizefitError::Read(format!("{}: {}", context, err))
    }

    pub(crate) fn write(context: &str, err: impl std::fmt::Display) -> Self {
        SizefitError::Write(format!("{}: {}", context, err))
    }
}

/// Result type alias for Sizefit operations
pub type SizefitResult<T> = std::result::Result<T, SizefitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_not_fatal() {
        assert!(SizefitError::Cancelled.is_cancellation());
        assert!(!SizefitError::Cancelled.is_fatal());
        assert!(SizefitError::NoVideoTrack.is_fatal());
        assert!(SizefitError::Write("disk full".into()).is_fatal());
    }

    #[test]
    fn test_error_messages_carry_detail() {
        let err = SizefitError::read("demux packet", "end of file");
        assert_eq!(err.to_string(), "Read error: demux packet: end of file");

        let err = SizefitError::SourceNotFound { path: "a.mov".into() };
        assert_eq!(err.to_string(), "Source file not found: a.mov");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SizefitError = io.into();
        assert!(matches!(err, SizefitError::Io(_)));
    }
}
