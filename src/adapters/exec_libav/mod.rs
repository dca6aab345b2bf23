//! Transcode backend using libav bindings
//!
//! Readers decode, scale and orient on their lane thread; encoders share one
//! MP4 muxer behind a mutex so both lanes can write interleaved packets.

mod reader;
mod writer;

use std::path::Path;
use std::sync::{Arc, Mutex};

use ffmpeg_next::util::frame;
use tracing::info;

use crate::adapters::init_libav;
use crate::config::HardwareAcceleration;
use crate::domain::model::*;
use crate::engine::DecodeConfiguration;
use crate::error::{SizefitError, SizefitResult};
use crate::ports::*;

use reader::{LibavAudioReader, LibavVideoReader};
use writer::{LibavAudioEncoder, LibavContainer, LibavVideoEncoder, SharedMuxer};

/// Audio lane output format: 48 kHz stereo planar float
pub(crate) const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// One display-oriented YUV 4:2:0 frame on the output timeline
pub struct VideoSample {
    frame: frame::Video,
    /// Output slot, in units of `1 / frame_rate`
    slot: u64,
    frame_rate: u32,
}

impl Timestamped for VideoSample {
    fn presentation_seconds(&self) -> f64 {
        self.slot as f64 / self.frame_rate.max(1) as f64
    }
}

/// Resampled audio within the selected range
pub struct AudioSample {
    frame: frame::Audio,
    /// Seconds from the range start; negative when the frame begins before it
    presentation: f64,
}

impl Timestamped for AudioSample {
    fn presentation_seconds(&self) -> f64 {
        self.presentation
    }
}

/// libav implementation of [`TranscodeBackend`]
pub struct LibavBackend {
    acceleration: HardwareAcceleration,
}

impl LibavBackend {
    pub fn new(acceleration: HardwareAcceleration) -> SizefitResult<Self> {
        init_libav()?;
        info!("Transcode backend ready (hardware acceleration: {})", acceleration);
        Ok(Self { acceleration })
    }
}

impl TranscodeBackend for LibavBackend {
    type VideoFrame = VideoSample;
    type AudioFrame = AudioSample;

    fn open_video_reader(
        &self,
        source: &Path,
        decode: &DecodeConfiguration,
        plan: &EncodingPlan,
        trim: Option<&TrimRange>,
    ) -> SizefitResult<Box<dyn FrameReader<VideoSample>>> {
        let reader = LibavVideoReader::open(source, *decode, plan.frame_rate, trim)?;
        Ok(Box::new(reader))
    }

    fn open_audio_reader(
        &self,
        source: &Path,
        trim: Option<&TrimRange>,
    ) -> SizefitResult<Option<Box<dyn FrameReader<AudioSample>>>> {
        Ok(LibavAudioReader::open(source, trim)?
            .map(|reader| Box::new(reader) as Box<dyn FrameReader<AudioSample>>))
    }

    fn create_writer(
        &self,
        output: &Path,
        with_audio: bool,
    ) -> SizefitResult<WriterSession<VideoSample, AudioSample>> {
        // The partial file has no .mp4 extension, so the muxer is named explicitly
        let octx = ffmpeg_next::format::output_as(&output, "mp4")
            .map_err(|e| SizefitError::write(&format!("create {}", output.display()), e))?;
        let muxer = Arc::new(Mutex::new(SharedMuxer::new(octx)));

        let video = Box::new(LibavVideoEncoder::new(Arc::clone(&muxer), self.acceleration));
        let audio = with_audio.then(|| {
            Box::new(LibavAudioEncoder::new(Arc::clone(&muxer)))
                as Box<dyn SampleEncoder<AudioSample>>
        });

        Ok(WriterSession {
            video,
            audio,
            container: Box::new(LibavContainer::new(muxer)),
        })
    }
}
