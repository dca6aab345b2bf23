//! Encoders and the shared MP4 muxer

use std::sync::{Arc, Mutex, MutexGuard};

use ffmpeg_next::{
    self as ffmpeg, codec, encoder,
    format::{self, sample::Type as SampleType, Pixel, Sample},
    util::{
        channel_layout::{ChannelLayout, ChannelLayoutMask},
        frame,
    },
    Codec, Dictionary, Packet, Rational,
};
use tracing::{debug, info, warn};

use super::{AudioSample, VideoSample, AUDIO_SAMPLE_RATE};
use crate::config::HardwareAcceleration;
use crate::domain::model::{EncodingPlan, VideoCodec};
use crate::error::{SizefitError, SizefitResult};
use crate::ports::{OutputContainer, SampleEncoder, Submission};

/// Used when a plan carries no audio bitrate but the writer was asked for audio
const DEFAULT_AUDIO_BITRATE_BPS: u64 = 128_000;

/// Output context shared by both encoders and the container
pub(super) struct SharedMuxer {
    octx: format::context::Output,
}

// SAFETY: every access goes through the surrounding Mutex, so the output
// context is never touched by two threads at once.
unsafe impl Send for SharedMuxer {}

impl SharedMuxer {
    pub(super) fn new(octx: format::context::Output) -> Self {
        Self { octx }
    }

    fn global_header(&self) -> bool {
        self.octx
            .format()
            .flags()
            .contains(format::flag::Flags::GLOBAL_HEADER)
    }
}

type Muxer = Arc<Mutex<SharedMuxer>>;

fn lock(muxer: &Muxer) -> SizefitResult<MutexGuard<'_, SharedMuxer>> {
    muxer
        .lock()
        .map_err(|_| SizefitError::Internal("muxer lock poisoned".to_string()))
}

fn is_again(err: &ffmpeg::Error) -> bool {
    matches!(err, ffmpeg::Error::Other { errno } if *errno == ffmpeg::error::EAGAIN)
}

/// Write every packet the encoder has ready; returns the bytes written
fn drain_packets(
    encoder: &mut encoder::Encoder,
    muxer: &Muxer,
    stream_index: usize,
    time_base: Rational,
) -> SizefitResult<u64> {
    let mut written = 0u64;
    let mut packet = Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        let mut guard = lock(muxer)?;
        let stream_time_base = guard
            .octx
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| SizefitError::Internal(format!("missing output stream {}", stream_index)))?;
        packet.set_stream(stream_index);
        packet.rescale_ts(time_base, stream_time_base);
        written += packet.size() as u64;
        packet
            .write_interleaved(&mut guard.octx)
            .map_err(|e| SizefitError::write("write packet", e))?;
    }
    Ok(written)
}

/// Encoder names to try, hardware first, for a codec and acceleration preference
fn encoder_candidates(codec: VideoCodec, acceleration: HardwareAcceleration) -> Vec<&'static str> {
    let family = match codec {
        VideoCodec::H264 => "h264",
        VideoCodec::Hevc => "hevc",
    };
    let hardware: &[&str] = match acceleration {
        HardwareAcceleration::None => &[],
        HardwareAcceleration::VideoToolbox => &["videotoolbox"],
        HardwareAcceleration::Nvenc => &["nvenc"],
        HardwareAcceleration::Qsv => &["qsv"],
        HardwareAcceleration::Amf => &["amf"],
        HardwareAcceleration::Vaapi => &["vaapi"],
        HardwareAcceleration::Auto if cfg!(target_os = "macos") => &["videotoolbox"],
        HardwareAcceleration::Auto => &["nvenc", "qsv", "amf"],
    };
    let software = match codec {
        VideoCodec::H264 => "libx264",
        VideoCodec::Hevc => "libx265",
    };

    let mut names: Vec<&'static str> = hardware
        .iter()
        .map(|suffix| match (family, *suffix) {
            ("h264", "videotoolbox") => "h264_videotoolbox",
            ("h264", "nvenc") => "h264_nvenc",
            ("h264", "qsv") => "h264_qsv",
            ("h264", "amf") => "h264_amf",
            ("h264", _) => "h264_vaapi",
            (_, "videotoolbox") => "hevc_videotoolbox",
            (_, "nvenc") => "hevc_nvenc",
            (_, "qsv") => "hevc_qsv",
            (_, "amf") => "hevc_amf",
            _ => "hevc_vaapi",
        })
        .collect();
    names.push(software);
    names
}

/// 75% of the cores, leaving room for the decode lanes
fn encoder_threads() -> usize {
    let cores = num_cpus::get();
    ((cores as f64 * 0.75).ceil() as usize).clamp(1, 16)
}

fn open_video_encoder(
    codec: Codec,
    plan: &EncodingPlan,
    global_header: bool,
) -> Result<encoder::Video, ffmpeg::Error> {
    let mut setup = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()?;
    let rate = plan.frame_rate.max(1) as i32;
    let bitrate = plan.target_bitrate_bps as usize;

    setup.set_width(plan.writer_resolution.width);
    setup.set_height(plan.writer_resolution.height);
    setup.set_format(Pixel::YUV420P);
    setup.set_time_base(Rational::new(1, rate));
    setup.set_frame_rate(Some(Rational::new(rate, 1)));
    setup.set_bit_rate(bitrate);
    setup.set_max_bit_rate(bitrate);
    setup.set_gop(plan.key_frame_interval_frames);
    setup.set_max_b_frames(0);
    if global_header {
        setup.set_flags(codec::flag::Flags::GLOBAL_HEADER);
    }

    let mut opts = Dictionary::new();
    opts.set("bufsize", &(plan.target_bitrate_bps * 2).to_string());
    if matches!(codec.name(), "libx264" | "libx265") {
        opts.set("preset", "medium");
        opts.set("threads", &encoder_threads().to_string());
    }
    setup.open_as_with(codec, opts)
}

struct OpenVideo {
    encoder: encoder::Video,
    stream_index: usize,
    time_base: Rational,
}

/// Video lane encoder: hardware when available, software otherwise
pub(super) struct LibavVideoEncoder {
    muxer: Muxer,
    acceleration: HardwareAcceleration,
    state: Option<OpenVideo>,
    bytes: u64,
}

// SAFETY: owned by a single lane thread; the muxer it writes to is behind a Mutex.
unsafe impl Send for LibavVideoEncoder {}

impl LibavVideoEncoder {
    pub(super) fn new(muxer: Muxer, acceleration: HardwareAcceleration) -> Self {
        Self {
            muxer,
            acceleration,
            state: None,
            bytes: 0,
        }
    }

    fn state(&mut self) -> SizefitResult<&mut OpenVideo> {
        self.state
            .as_mut()
            .ok_or_else(|| SizefitError::Internal("video encoder used before configure".to_string()))
    }

    fn drain(&mut self) -> SizefitResult<()> {
        let muxer = Arc::clone(&self.muxer);
        let state = self.state()?;
        let written = drain_packets(&mut state.encoder, &muxer, state.stream_index, state.time_base)?;
        self.bytes += written;
        Ok(())
    }
}

impl SampleEncoder<VideoSample> for LibavVideoEncoder {
    fn configure(&mut self, plan: &EncodingPlan) -> SizefitResult<()> {
        let mut guard = lock(&self.muxer)?;
        let global_header = guard.global_header();

        let mut opened = None;
        for name in encoder_candidates(plan.codec, self.acceleration) {
            let Some(codec) = encoder::find_by_name(name) else {
                continue;
            };
            match open_video_encoder(codec, plan, global_header) {
                Ok(encoder) => {
                    opened = Some((codec, encoder));
                    break;
                }
                Err(e) => warn!("Encoder {} rejected the configuration: {}", name, e),
            }
        }
        // Last resort: whatever encoder libav registers for the codec id
        if opened.is_none() {
            let id = match plan.codec {
                VideoCodec::H264 => codec::Id::H264,
                VideoCodec::Hevc => codec::Id::HEVC,
            };
            if let Some(codec) = encoder::find(id) {
                let encoder = open_video_encoder(codec, plan, global_header)
                    .map_err(|e| SizefitError::write(&format!("open {} encoder", plan.codec), e))?;
                opened = Some((codec, encoder));
            }
        }
        let (codec, encoder) = opened
            .ok_or_else(|| SizefitError::Write(format!("no {} encoder available", plan.codec)))?;

        let mut stream = guard
            .octx
            .add_stream(codec)
            .map_err(|e| SizefitError::write("add video stream", e))?;
        stream.set_parameters(&encoder);
        let time_base = Rational::new(1, plan.frame_rate.max(1) as i32);
        stream.set_time_base(time_base);
        if plan.codec == VideoCodec::Hevc {
            // SAFETY: codecpar belongs to the stream just added and is not aliased.
            unsafe {
                (*(*stream.as_mut_ptr()).codecpar).codec_tag = u32::from_le_bytes(*b"hvc1");
            }
        }
        let stream_index = stream.index();

        info!(
            "Video encoder {} at {} ({} bps, {} fps, GOP {})",
            codec.name(),
            plan.writer_resolution,
            plan.target_bitrate_bps,
            plan.frame_rate,
            plan.key_frame_interval_frames
        );
        self.state = Some(OpenVideo {
            encoder,
            stream_index,
            time_base,
        });
        Ok(())
    }

    fn submit(&mut self, item: VideoSample) -> SizefitResult<Submission<VideoSample>> {
        let state = self.state()?;
        match state.encoder.send_frame(&item.frame) {
            Ok(()) => {}
            Err(e) if is_again(&e) => return Ok(Submission::Blocked(item)),
            Err(e) => return Err(SizefitError::write("encode video frame", e)),
        }
        self.drain()?;
        Ok(Submission::Accepted)
    }

    fn wait_ready(&mut self) -> SizefitResult<()> {
        self.drain()
    }

    fn finish(&mut self) -> SizefitResult<u64> {
        self.state()?
            .encoder
            .send_eof()
            .map_err(|e| SizefitError::write("flush video encoder", e))?;
        self.drain()?;
        debug!("Video encoder wrote {} bytes", self.bytes);
        Ok(self.bytes)
    }
}

/// Stereo planar float sample queue re-chunked to the encoder's frame size
#[derive(Default)]
struct SampleFifo {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl SampleFifo {
    fn len(&self) -> usize {
        self.left.len()
    }

    /// Queue `frame`, leaving out its first `skip` samples
    fn push(&mut self, frame: &frame::Audio, skip: usize) {
        let samples = frame.samples();
        if samples <= skip {
            return;
        }
        let right = if frame.ch_layout().channels() >= 2 { 1 } else { 0 };
        // SAFETY: planar f32 frames hold `samples` floats in each plane.
        unsafe {
            self.left.extend_from_slice(&float_plane(frame, 0, samples)[skip..]);
            self.right.extend_from_slice(&float_plane(frame, right, samples)[skip..]);
        }
    }

    fn pad(&mut self, samples: usize) {
        self.left.resize(self.left.len() + samples, 0.0);
        self.right.resize(self.right.len() + samples, 0.0);
    }

    /// Pop `size` samples, zero-padding whatever is missing
    fn pop(&mut self, size: usize, pts: i64) -> frame::Audio {
        let available = self.len().min(size);
        let mut out =
            frame::Audio::new(Sample::F32(SampleType::Planar), size, ChannelLayoutMask::STEREO);
        out.set_rate(AUDIO_SAMPLE_RATE);
        out.set_pts(Some(pts));

        for (plane, queue) in [(0, &mut self.left), (1, &mut self.right)] {
            // SAFETY: the frame was just allocated as stereo planar f32 with `size` samples.
            let dst = unsafe {
                std::slice::from_raw_parts_mut(out.data_mut(plane).as_mut_ptr() as *mut f32, size)
            };
            dst[..available].copy_from_slice(&queue[..available]);
            dst[available..].fill(0.0);
            queue.drain(..available);
        }
        out
    }
}

/// Source jitter below this many samples is absorbed without padding or cutting
const AUDIO_DRIFT_TOLERANCE: i64 = 480;

/// How an incoming audio frame joins the queued sample timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Splice {
    Append,
    /// Silence to insert before the frame
    Pad(usize),
    /// Leading samples of the frame to drop
    Skip(usize),
}

/// `queued_end` is the sample position right after everything queued so far;
/// `presentation` is the frame's start relative to the range start.
fn splice(queued_end: i64, presentation: f64) -> Splice {
    let position = (presentation * AUDIO_SAMPLE_RATE as f64).round() as i64;
    let offset = position - queued_end;
    if position < 0 {
        // Straddles the range start: only the part from zero on is kept
        Splice::Skip((-position).max(-offset) as usize)
    } else if offset > AUDIO_DRIFT_TOLERANCE {
        Splice::Pad(offset as usize)
    } else if offset < -AUDIO_DRIFT_TOLERANCE {
        Splice::Skip((-offset) as usize)
    } else {
        Splice::Append
    }
}

unsafe fn float_plane(frame: &frame::Audio, plane: usize, samples: usize) -> &[f32] {
    std::slice::from_raw_parts(frame.data(plane).as_ptr() as *const f32, samples)
}

struct OpenAudio {
    encoder: encoder::Audio,
    stream_index: usize,
    time_base: Rational,
    frame_size: usize,
    next_pts: i64,
}

/// AAC audio lane encoder
pub(super) struct LibavAudioEncoder {
    muxer: Muxer,
    state: Option<OpenAudio>,
    fifo: SampleFifo,
    bytes: u64,
}

// SAFETY: owned by a single lane thread; the muxer it writes to is behind a Mutex.
unsafe impl Send for LibavAudioEncoder {}

impl LibavAudioEncoder {
    pub(super) fn new(muxer: Muxer) -> Self {
        Self {
            muxer,
            state: None,
            fifo: SampleFifo::default(),
            bytes: 0,
        }
    }

    fn drain(&mut self) -> SizefitResult<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| SizefitError::Internal("audio encoder used before configure".to_string()))?;
        self.bytes += drain_packets(&mut state.encoder, &self.muxer, state.stream_index, state.time_base)?;
        Ok(())
    }

    /// Send whole frames from the FIFO; with `flush`, the zero-padded tail too
    fn encode_queued(&mut self, flush: bool) -> SizefitResult<()> {
        loop {
            let Some(state) = self.state.as_mut() else {
                return Err(SizefitError::Internal(
                    "audio encoder used before configure".to_string(),
                ));
            };
            let queued = self.fifo.len();
            if queued == 0 || (queued < state.frame_size && !flush) {
                return Ok(());
            }
            let frame = self.fifo.pop(state.frame_size, state.next_pts);
            state.next_pts += state.frame_size as i64;

            loop {
                let state = self
                    .state
                    .as_mut()
                    .ok_or_else(|| SizefitError::Internal("audio encoder state lost".to_string()))?;
                match state.encoder.send_frame(&frame) {
                    Ok(()) => break,
                    Err(e) if is_again(&e) => self.drain()?,
                    Err(e) => return Err(SizefitError::write("encode audio frame", e)),
                }
            }
            self.drain()?;
        }
    }
}

impl SampleEncoder<AudioSample> for LibavAudioEncoder {
    fn configure(&mut self, plan: &EncodingPlan) -> SizefitResult<()> {
        let mut guard = lock(&self.muxer)?;
        let codec = encoder::find(codec::Id::AAC)
            .ok_or_else(|| SizefitError::Write("no AAC encoder available".to_string()))?;
        let bitrate = plan.audio_bitrate_bps.unwrap_or(DEFAULT_AUDIO_BITRATE_BPS);
        let time_base = Rational::new(1, AUDIO_SAMPLE_RATE as i32);

        let mut setup = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|e| SizefitError::write("create audio encoder", e))?;
        setup.set_rate(AUDIO_SAMPLE_RATE as i32);
        setup.set_ch_layout(ChannelLayout::STEREO);
        setup.set_format(Sample::F32(SampleType::Planar));
        setup.set_bit_rate(bitrate as usize);
        setup.set_time_base(time_base);
        if guard.global_header() {
            setup.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }
        let encoder = setup
            .open_as(codec)
            .map_err(|e| SizefitError::write("open AAC encoder", e))?;

        let mut stream = guard
            .octx
            .add_stream(codec)
            .map_err(|e| SizefitError::write("add audio stream", e))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);
        let stream_index = stream.index();

        let frame_size = (encoder.frame_size() as usize).max(1024);
        info!("Audio encoder aac at {} bps, frame size {}", bitrate, frame_size);
        self.state = Some(OpenAudio {
            encoder,
            stream_index,
            time_base,
            frame_size,
            next_pts: 0,
        });
        Ok(())
    }

    fn submit(&mut self, item: AudioSample) -> SizefitResult<Submission<AudioSample>> {
        let next_pts = self
            .state
            .as_ref()
            .ok_or_else(|| SizefitError::Internal("audio encoder used before configure".to_string()))?
            .next_pts;
        let queued_end = next_pts + self.fifo.len() as i64;
        match splice(queued_end, item.presentation) {
            Splice::Append => self.fifo.push(&item.frame, 0),
            Splice::Pad(samples) => {
                debug!(
                    "Audio gap of {} samples at {:.3}s filled with silence",
                    samples, item.presentation
                );
                self.fifo.pad(samples);
                self.fifo.push(&item.frame, 0);
            }
            Splice::Skip(samples) => self.fifo.push(&item.frame, samples),
        }
        self.encode_queued(false)?;
        Ok(Submission::Accepted)
    }

    fn wait_ready(&mut self) -> SizefitResult<()> {
        self.drain()
    }

    fn finish(&mut self) -> SizefitResult<u64> {
        self.encode_queued(true)?;
        if let Some(state) = self.state.as_mut() {
            state
                .encoder
                .send_eof()
                .map_err(|e| SizefitError::write("flush audio encoder", e))?;
        }
        self.drain()?;
        debug!("Audio encoder wrote {} bytes", self.bytes);
        Ok(self.bytes)
    }
}

/// Header and trailer of the shared MP4 file
pub(super) struct LibavContainer {
    muxer: Muxer,
}

impl LibavContainer {
    pub(super) fn new(muxer: Muxer) -> Self {
        Self { muxer }
    }
}

impl OutputContainer for LibavContainer {
    fn begin(&mut self) -> SizefitResult<()> {
        lock(&self.muxer)?
            .octx
            .write_header()
            .map_err(|e| SizefitError::write("write container header", e))
    }

    fn finalize(&mut self) -> SizefitResult<()> {
        lock(&self.muxer)?
            .octx
            .write_trailer()
            .map_err(|e| SizefitError::write("write container trailer", e))
    }
}
