// Inspect interactor - Orchestrates media file inspection use case

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::app::compress_interactor::ensure_source;
use crate::domain::model::*;
use crate::error::{SizefitError, SizefitResult};
use crate::ports::*;
use crate::utils::{format_duration, format_file_size};

/// Interactor for media file inspection use case
pub struct InspectInteractor {
    probe_port: Arc<dyn ProbePort>,
}

impl InspectInteractor {
    /// Create new inspect interactor with injected ports
    pub fn new(probe_port: Arc<dyn ProbePort>) -> Self {
        Self { probe_port }
    }

    /// Probe only; nothing is written
    pub async fn inspect(&self, source: &Path) -> SizefitResult<SourceAnalysis> {
        info!("Starting media file inspection for: {}", source.display());
        ensure_source(source).await?;
        let analysis = self.probe_port.analyze(source).await?;
        info!(
            "Media file probed successfully: {} displayed, {:.3}s",
            analysis.display_resolution, analysis.duration_seconds
        );
        Ok(analysis)
    }

    /// Format analysis as JSON
    pub fn format_as_json(analysis: &SourceAnalysis) -> SizefitResult<String> {
        serde_json::to_string_pretty(analysis)
            .map_err(|e| SizefitError::Internal(format!("JSON serialization failed: {}", e)))
    }

    /// Format analysis as human-readable text
    pub fn format_as_text(source: &Path, analysis: &SourceAnalysis) -> String {
        let (orientation, snapped) = analysis.orientation_transform.orientation();
        let mut output = String::new();

        output.push_str("Media File Information:\n");
        output.push_str(&format!("  File: {}\n", source.display()));
        output.push_str(&format!(
            "  Duration: {} ({:.3}s)\n",
            format_duration(analysis.duration_seconds),
            analysis.duration_seconds
        ));
        output.push_str(&format!(
            "  File Size: {}\n",
            format_file_size(analysis.file_size_bytes)
        ));
        output.push_str(&format!(
            "  Bitrate: {:.0} kbps\n",
            analysis.estimated_bitrate_bps / 1000.0
        ));
        output.push_str(&format!(
            "  Video: {} natural, {} displayed @ {:.2}fps\n",
            analysis.natural_resolution, analysis.display_resolution, analysis.frame_rate
        ));
        output.push_str(&format!(
            "  Orientation: {:?}{}\n",
            orientation,
            if snapped { " (snapped)" } else { "" }
        ));
        output.push_str(&format!(
            "  Audio: {}\n",
            if analysis.has_audio_track { "yes" } else { "no" }
        ));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedProbe;

    #[async_trait]
    impl ProbePort for FixedProbe {
        async fn analyze(&self, _source: &Path) -> SizefitResult<SourceAnalysis> {
            let natural = Resolution::new(1920, 1080)?;
            SourceAnalysis::new(
                12.5,
                4 * 1024 * 1024,
                natural,
                AffineTransform::for_orientation(Orientation::Right, natural),
                29.97,
                2_684_354.0,
                true,
            )
        }
    }

    #[tokio::test]
    async fn test_missing_source_is_reported() {
        let interactor = InspectInteractor::new(Arc::new(FixedProbe));
        let result = interactor.inspect(Path::new("/no/such/file.mp4")).await;
        assert!(matches!(result, Err(SizefitError::SourceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_text_report_shows_display_size() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let interactor = InspectInteractor::new(Arc::new(FixedProbe));
        let analysis = interactor.inspect(file.path()).await.unwrap();
        let text = InspectInteractor::format_as_text(file.path(), &analysis);
        assert!(text.contains("1920x1080 natural, 1080x1920 displayed"));
        assert!(text.contains("Orientation: Right"));
        assert!(text.contains("Audio: yes"));

        let json = InspectInteractor::format_as_json(&analysis).unwrap();
        assert!(json.contains("\"has_audio_track\": true"));
    }
}
