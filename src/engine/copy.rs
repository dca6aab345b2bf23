//! Passthrough copy for sources already within budget

use std::path::{Path, PathBuf};

use tracing::info;

use crate::engine::cancel::CancellationToken;
use crate::error::{SizefitError, SizefitResult};
use crate::output::PartialOutput;

/// Byte-for-byte copy of the source through a partial file
pub struct PassthroughCopier;

impl PassthroughCopier {
    pub fn new() -> Self {
        Self
    }

    /// Copy `source` to `destination`; returns the committed path and its size
    pub async fn copy(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> SizefitResult<(PathBuf, u64)> {
        cancel.check()?;
        let partial = PartialOutput::create(destination)?;
        let bytes = tokio::fs::copy(source, partial.path())
            .await
            .map_err(|e| SizefitError::read(&format!("copy {}", source.display()), e))?;
        cancel.check()?;

        let path = partial.commit()?;
        info!("Source already within budget, copied {} bytes", bytes);
        Ok((path, bytes))
    }
}

impl Default for PassthroughCopier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mp4");
        std::fs::write(&source, b"already small").unwrap();
        let destination = dir.path().join("out.mp4");

        let (path, bytes) = PassthroughCopier::new()
            .copy(&source, &destination, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(path, destination);
        assert_eq!(bytes, 13);
        assert_eq!(std::fs::read(&destination).unwrap(), b"already small");
    }

    #[tokio::test]
    async fn test_cancelled_copy_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mp4");
        std::fs::write(&source, b"data").unwrap();
        let destination = dir.path().join("out.mp4");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = PassthroughCopier::new().copy(&source, &destination, &cancel).await;
        assert!(matches!(result, Err(SizefitError::Cancelled)));
        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
