//! Output file ownership: partial files, atomic commit and cleanup

use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use tracing::{debug, info};

use crate::error::{SizefitError, SizefitResult};

/// Hidden partial file next to its destination.
///
/// Dropping it without [`commit`](Self::commit) deletes the partial, so a
/// failed or cancelled run leaves nothing behind.
#[derive(Debug)]
pub struct PartialOutput {
    partial: TempPath,
    destination: PathBuf,
}

impl PartialOutput {
    /// Reserve a partial file in the destination's directory
    pub fn create(destination: &Path) -> SizefitResult<Self> {
        let dir = parent_dir(destination);
        std::fs::create_dir_all(&dir).map_err(|e| {
            SizefitError::write(&format!("create output directory {}", dir.display()), e)
        })?;

        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SizefitError::InvalidRequest(format!(
                    "Output path has no file name: {}",
                    destination.display()
                ))
            })?;

        let partial = Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".partial")
            .tempfile_in(&dir)
            .map_err(|e| SizefitError::write("create partial output", e))?
            .into_temp_path();

        debug!("Writing to partial file: {}", partial.display());
        Ok(Self {
            partial,
            destination: destination.to_path_buf(),
        })
    }

    /// Where the bytes are written until commit
    pub fn path(&self) -> &Path {
        &self.partial
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Atomically rename the partial onto the destination
    pub fn commit(self) -> SizefitResult<PathBuf> {
        let destination = self.destination;
        self.partial
            .persist(&destination)
            .map_err(|e| SizefitError::write("commit output", e.error))?;
        info!("Output committed: {}", destination.display());
        Ok(destination)
    }
}

/// Final output location for one call.
///
/// A generated location reserves a unique file in the temp directory; the
/// reservation is removed again unless [`release`](Self::release) is called.
#[derive(Debug)]
pub struct OutputTarget {
    path: PathBuf,
    reservation: Option<TempPath>,
}

impl OutputTarget {
    /// Use the caller's path, or reserve `sizefit-<stem>-XXXXXX.mp4` in `temp_dir`
    pub fn resolve(requested: Option<&Path>, source: &Path, temp_dir: &Path) -> SizefitResult<Self> {
        if let Some(path) = requested {
            return Ok(Self {
                path: path.to_path_buf(),
                reservation: None,
            });
        }

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        std::fs::create_dir_all(temp_dir)
            .map_err(|e| SizefitError::write("create temp directory", e))?;
        let reservation = Builder::new()
            .prefix(&format!("sizefit-{}-", stem))
            .suffix(".mp4")
            .tempfile_in(temp_dir)
            .map_err(|e| SizefitError::write("reserve output file", e))?
            .into_temp_path();

        Ok(Self {
            path: reservation.to_path_buf(),
            reservation: Some(reservation),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand the file over to the caller
    pub fn release(self) -> PathBuf {
        if let Some(reservation) = self.reservation {
            // keep() only fails on Windows when the path vanished; the path is still ours
            let _ = reservation.keep();
        }
        self.path
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.mp4");
        let partial_path = {
            let partial = PartialOutput::create(&destination).unwrap();
            std::fs::write(partial.path(), b"half").unwrap();
            partial.path().to_path_buf()
        };
        assert!(!partial_path.exists());
        assert!(!destination.exists());
    }

    #[test]
    fn test_commit_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("nested").join("out.mp4");
        let partial = PartialOutput::create(&destination).unwrap();
        let partial_path = partial.path().to_path_buf();
        assert!(partial_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".out.mp4."));
        std::fs::write(partial.path(), b"encoded").unwrap();

        let committed = partial.commit().unwrap();
        assert_eq!(committed, destination);
        assert_eq!(std::fs::read(&destination).unwrap(), b"encoded");
        assert!(!partial_path.exists());
    }

    #[test]
    fn test_generated_target_cleaned_unless_released() {
        let dir = tempfile::tempdir().unwrap();
        let source = Path::new("/videos/holiday.mov");

        let target = OutputTarget::resolve(None, source, dir.path()).unwrap();
        let dropped = target.path().to_path_buf();
        assert!(dropped.file_name().unwrap().to_string_lossy().starts_with("sizefit-holiday-"));
        drop(target);
        assert!(!dropped.exists());

        let target = OutputTarget::resolve(None, source, dir.path()).unwrap();
        let kept = target.release();
        assert!(kept.exists());
    }

    #[test]
    fn test_requested_target_is_used_verbatim() {
        let target =
            OutputTarget::resolve(Some(Path::new("/tmp/x.mp4")), Path::new("a.mov"), Path::new("/tmp"))
                .unwrap();
        assert_eq!(target.release(), PathBuf::from("/tmp/x.mp4"));
    }
}
