// Probe LibAV adapter - Media file analysis using libav

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ffmpeg_next::{self as ffmpeg, ffi, format, media, Rational};
use tracing::debug;

use crate::adapters::init_libav;
use crate::domain::model::SourceAnalysis;
use crate::error::{SizefitError, SizefitResult};
use crate::ports::ProbePort;
use crate::probe::{MediaInspector, RawMediaMetadata, RawVideoTrack};

/// Bytes in a 3x3 matrix of 32-bit words
const DISPLAY_MATRIX_BYTES: usize = 36;

/// LibAV-based media probing adapter
pub struct LibavProbeAdapter {
    inspector: MediaInspector,
}

impl LibavProbeAdapter {
    /// Create new LibAV probing adapter
    pub fn new() -> SizefitResult<Self> {
        init_libav()?;
        Ok(Self {
            inspector: MediaInspector::new(),
        })
    }

    /// Read container and stream metadata without decoding any frames
    pub fn read_metadata(source: &Path) -> SizefitResult<RawMediaMetadata> {
        let file_size_bytes = std::fs::metadata(source)
            .map_err(|_| SizefitError::SourceNotFound {
                path: source.display().to_string(),
            })?
            .len();

        let ictx = format::input(&source)
            .map_err(|e| SizefitError::read(&format!("open {}", source.display()), e))?;

        let has_audio = ictx.streams().best(media::Type::Audio).is_some();
        let container_duration = seconds_from_av_time(ictx.duration());
        let stated_bitrate_bps = u64::try_from(ictx.bit_rate()).ok().filter(|b| *b > 0);

        let (video, stream_duration) = match ictx.streams().best(media::Type::Video) {
            Some(stream) => {
                let track = video_track(&ictx, &stream)?;
                let duration = stream_seconds(stream.duration(), stream.time_base());
                (Some(track), duration)
            }
            None => (None, None),
        };

        let raw = RawMediaMetadata {
            format: ictx.format().name().to_string(),
            file_size_bytes,
            duration_seconds: container_duration.or(stream_duration),
            stated_bitrate_bps,
            video,
            has_audio,
        };
        debug!("Raw metadata for {}: {:?}", source.display(), raw);
        Ok(raw)
    }
}

#[async_trait]
impl ProbePort for LibavProbeAdapter {
    async fn analyze(&self, source: &Path) -> SizefitResult<SourceAnalysis> {
        let path: PathBuf = source.to_path_buf();
        let raw = tokio::task::spawn_blocking(move || Self::read_metadata(&path))
            .await
            .map_err(|e| SizefitError::Internal(format!("probe task failed: {}", e)))??;
        self.inspector.analyze(&raw)
    }
}

fn video_track(
    ictx: &format::context::Input,
    stream: &format::stream::Stream,
) -> SizefitResult<RawVideoTrack> {
    let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .and_then(|context| context.decoder().video())
        .map_err(|e| SizefitError::read("open video decoder parameters", e))?;

    let rotation_tag = stream
        .metadata()
        .get("rotate")
        .or_else(|| ictx.metadata().get("rotate"))
        .and_then(|tag| tag.trim().parse::<f64>().ok());

    Ok(RawVideoTrack {
        codec: format!("{:?}", stream.parameters().id()).to_lowercase(),
        width: decoder.width(),
        height: decoder.height(),
        average_frame_rate: rate(stream.avg_frame_rate()),
        base_frame_rate: rate(stream.rate()),
        display_matrix: display_matrix(stream),
        rotation_tag,
    })
}

/// Display matrix from the stream's coded side data, if present
fn display_matrix(stream: &format::stream::Stream) -> Option<[i32; 9]> {
    // SAFETY: codecpar and its side data are owned by the stream, which the
    // input context keeps alive for the duration of this borrow. The entry is
    // only read after its size is checked.
    let bytes = unsafe {
        let codecpar = (*stream.as_ptr()).codecpar;
        if codecpar.is_null() {
            return None;
        }
        let entry = ffi::av_packet_side_data_get(
            (*codecpar).coded_side_data,
            (*codecpar).nb_coded_side_data,
            ffi::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        );
        if entry.is_null() || (*entry).data.is_null() || (*entry).size < DISPLAY_MATRIX_BYTES {
            return None;
        }
        std::slice::from_raw_parts((*entry).data, DISPLAY_MATRIX_BYTES)
    };

    let mut matrix = [0i32; 9];
    for (word, chunk) in matrix.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Some(matrix)
}

fn rate(value: Rational) -> Option<f64> {
    if value.numerator() > 0 && value.denominator() > 0 {
        Some(f64::from(value))
    } else {
        None
    }
}

fn seconds_from_av_time(value: i64) -> Option<f64> {
    if value == ffi::AV_NOPTS_VALUE || value <= 0 {
        None
    } else {
        Some(value as f64 / ffi::AV_TIME_BASE as f64)
    }
}

fn stream_seconds(value: i64, time_base: Rational) -> Option<f64> {
    if value == ffi::AV_NOPTS_VALUE || value <= 0 || time_base.denominator() == 0 {
        None
    } else {
        Some(value as f64 * f64::from(time_base))
    }
}
