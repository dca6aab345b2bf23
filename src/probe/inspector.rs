//! Source analysis from raw metadata

use tracing::{debug, info, warn};

use crate::domain::model::{AffineTransform, Resolution, SourceAnalysis};
use crate::error::{SizefitError, SizefitResult};
use crate::probe::{RawMediaMetadata, RawVideoTrack};

/// Frame rate assumed when a stream reports none
const FALLBACK_FRAME_RATE: f64 = 30.0;

/// Relative disagreement above which the stated bitrate is distrusted
const BITRATE_MISMATCH_THRESHOLD: f64 = 0.20;

/// Turns probe output into a [`SourceAnalysis`]
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaInspector;

impl MediaInspector {
    pub fn new() -> Self {
        Self
    }

    /// Interpret raw metadata.
    ///
    /// The display resolution comes from applying the orientation transform
    /// to the decoded size, never from an unrotated metadata field.
    pub fn analyze(&self, raw: &RawMediaMetadata) -> SizefitResult<SourceAnalysis> {
        let video = raw.video.as_ref().ok_or(SizefitError::NoVideoTrack)?;
        let natural = Resolution::new(video.width, video.height)
            .map_err(|_| SizefitError::NoVideoTrack)?;

        let transform = self.orientation_transform(video, natural);
        let frame_rate = self.frame_rate(video);
        let duration = raw.duration_seconds.filter(|d| d.is_finite()).unwrap_or(0.0);
        let bitrate = reconcile_bitrate(raw.stated_bitrate_bps, raw.file_size_bytes, duration);

        let analysis = SourceAnalysis::new(
            duration,
            raw.file_size_bytes,
            natural,
            transform,
            frame_rate,
            bitrate,
            raw.has_audio,
        )?;

        info!(
            "Analyzed {} source: {:.2}s, natural {}, display {}, {:.2} fps, {:.0} bps, audio: {}",
            video.codec,
            analysis.duration_seconds,
            analysis.natural_resolution,
            analysis.display_resolution,
            analysis.frame_rate,
            analysis.estimated_bitrate_bps,
            analysis.has_audio_track
        );
        Ok(analysis)
    }

    /// Display matrix first, then a rotate tag, else identity.
    ///
    /// Non quarter-turn transforms are snapped so frames can be baked losslessly.
    fn orientation_transform(&self, video: &RawVideoTrack, natural: Resolution) -> AffineTransform {
        let transform = match (&video.display_matrix, video.rotation_tag) {
            (Some(matrix), _) => AffineTransform::from_display_matrix(matrix, natural),
            (None, Some(degrees)) => AffineTransform::from_rotation_degrees(degrees, natural),
            (None, None) => AffineTransform::identity(),
        };

        let (orientation, snapped) = transform.orientation();
        if snapped {
            warn!(
                "Orientation transform {:?} is not a quarter turn, snapping to {:?}",
                transform, orientation
            );
            return AffineTransform::for_orientation(orientation, natural);
        }
        debug!("Source orientation: {:?}", orientation);
        transform
    }

    fn frame_rate(&self, video: &RawVideoTrack) -> f64 {
        [video.average_frame_rate, video.base_frame_rate]
            .into_iter()
            .flatten()
            .find(|rate| rate.is_finite() && *rate > 0.0)
            .unwrap_or(FALLBACK_FRAME_RATE)
    }
}

/// Pick the bitrate to trust.
///
/// The value computed from size and duration wins when the container states
/// nothing or disagrees by more than 20%. Without a usable duration the
/// stated value is all there is.
pub fn reconcile_bitrate(stated: Option<u64>, file_size_bytes: u64, duration: f64) -> f64 {
    let stated = stated.filter(|bps| *bps > 0).map(|bps| bps as f64);
    if duration <= 0.0 {
        return stated.unwrap_or(0.0);
    }

    let computed = file_size_bytes as f64 * 8.0 / duration;
    match stated {
        Some(value) if (value - computed).abs() / computed.max(1.0) <= BITRATE_MISMATCH_THRESHOLD => {
            value
        }
        Some(value) => {
            warn!(
                "Stated bitrate {:.0} disagrees with size/duration {:.0}, using the latter",
                value, computed
            );
            computed
        }
        None => computed,
    }
}
