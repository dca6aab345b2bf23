//! Pull-based demux + decode for one lane

use std::collections::VecDeque;
use std::path::Path;

use ffmpeg_next::{
    self as ffmpeg, codec, ffi, format,
    format::{sample::Type as SampleType, Pixel, Sample},
    media,
    software::{resampling, scaling},
    util::{
        channel_layout::{ChannelLayout, ChannelLayoutMask},
        frame,
    },
    Packet, Rational,
};
use tracing::debug;

use super::{AudioSample, VideoSample, AUDIO_SAMPLE_RATE};
use crate::domain::model::TrimRange;
use crate::engine::orientation::reorient_plane;
use crate::engine::{DecodeConfiguration, FrameRateGate};
use crate::error::{SizefitError, SizefitResult};
use crate::ports::FrameReader;

/// Flush a decoder; a repeated end-of-stream is not an error
fn drain_decoder(result: Result<(), ffmpeg::Error>, what: &str) -> SizefitResult<()> {
    match result {
        Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
        Err(e) => Err(SizefitError::read(what, e)),
    }
}

fn open_input(source: &Path, trim: Option<&TrimRange>) -> SizefitResult<format::context::Input> {
    let mut ictx = format::input(&source)
        .map_err(|e| SizefitError::read(&format!("open {}", source.display()), e))?;
    if let Some(range) = trim.filter(|r| r.start > 0.0) {
        // Land on the keyframe at or before the start; preroll is dropped after decode
        let position = (range.start * ffi::AV_TIME_BASE as f64) as i64;
        ictx.seek(position, ..position)
            .map_err(|e| SizefitError::read(&format!("seek to {:.3}s", range.start), e))?;
    }
    Ok(ictx)
}

/// Demux state shared by both readers
struct Demux {
    input: format::context::Input,
    stream_index: usize,
    time_base: Rational,
    start: f64,
    end: Option<f64>,
    input_exhausted: bool,
    done: bool,
}

impl Demux {
    /// Next packet of the selected stream; `None` at end of input
    fn next_packet(&mut self) -> SizefitResult<Option<Packet>> {
        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => return Ok(Some(packet)),
                Ok(()) => continue,
                Err(ffmpeg::Error::Eof) => {
                    self.input_exhausted = true;
                    return Ok(None);
                }
                Err(e) => return Err(SizefitError::read("read packet", e)),
            }
        }
    }

    fn seconds(&self, timestamp: Option<i64>) -> Option<f64> {
        timestamp.map(|ts| ts as f64 * f64::from(self.time_base))
    }
}

/// Decodes the best video stream into display-oriented frames
pub(super) struct LibavVideoReader {
    demux: Demux,
    decoder: codec::decoder::Video,
    scaler: Option<scaling::Context>,
    decode: DecodeConfiguration,
    gate: FrameRateGate,
    frame_rate: u32,
    pending: VecDeque<VideoSample>,
}

// SAFETY: the reader is moved onto one lane thread and only used there; the
// raw libav contexts it owns are never shared.
unsafe impl Send for LibavVideoReader {}

impl LibavVideoReader {
    pub(super) fn open(
        source: &Path,
        decode: DecodeConfiguration,
        frame_rate: u32,
        trim: Option<&TrimRange>,
    ) -> SizefitResult<Self> {
        let input = open_input(source, trim)?;
        let (stream_index, time_base, parameters) = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or(SizefitError::NoVideoTrack)?;
            (stream.index(), stream.time_base(), stream.parameters())
        };
        let decoder = codec::context::Context::from_parameters(parameters)
            .and_then(|context| context.decoder().video())
            .map_err(|e| SizefitError::read("open video decoder", e))?;

        debug!(
            "Video reader: stream {}, time base {}, target {} fps",
            stream_index, time_base, frame_rate
        );
        Ok(Self {
            demux: Demux {
                input,
                stream_index,
                time_base,
                start: trim.map_or(0.0, |r| r.start),
                end: trim.map(|r| r.end),
                input_exhausted: false,
                done: false,
            },
            decoder,
            scaler: None,
            decode,
            gate: FrameRateGate::new(frame_rate),
            frame_rate: frame_rate.max(1),
            pending: VecDeque::new(),
        })
    }

    fn pump(&mut self) -> SizefitResult<()> {
        if self.demux.input_exhausted {
            // Drain frames held back by the decoder
            drain_decoder(self.decoder.send_eof(), "flush video decoder")?;
            self.receive_frames()?;
            self.demux.done = true;
            return Ok(());
        }
        if let Some(packet) = self.demux.next_packet()? {
            self.decoder
                .send_packet(&packet)
                .map_err(|e| SizefitError::read("decode video packet", e))?;
            self.receive_frames()?;
        }
        Ok(())
    }

    fn receive_frames(&mut self) -> SizefitResult<()> {
        let half_frame = 0.5 / self.frame_rate as f64;
        let mut decoded = frame::Video::empty();
        while !self.demux.done && self.decoder.receive_frame(&mut decoded).is_ok() {
            let timestamp = self
                .demux
                .seconds(decoded.timestamp().or(decoded.pts()))
                .unwrap_or(self.demux.start + self.gate.next_slot() as f64 / self.frame_rate as f64);

            if timestamp < self.demux.start - half_frame {
                continue;
            }
            if self.demux.end.is_some_and(|end| timestamp >= end) {
                self.demux.done = true;
                break;
            }
            let Some(slot) = self.gate.admit((timestamp - self.demux.start).max(0.0)) else {
                continue;
            };

            let frame = self.shape(&decoded, slot)?;
            self.pending.push_back(VideoSample {
                frame,
                slot,
                frame_rate: self.frame_rate,
            });
        }
        Ok(())
    }

    /// Scale to the pre-rotation size, then bake the orientation into the planes
    fn shape(&mut self, decoded: &frame::Video, slot: u64) -> SizefitResult<frame::Video> {
        let target = self.decode.scaled_natural;
        let stale = self.scaler.as_ref().map_or(true, |scaler| {
            let input = scaler.input();
            input.width != decoded.width()
                || input.height != decoded.height()
                || input.format != decoded.format()
        });
        if stale {
            let scaler = scaling::Context::get(
                decoded.format(),
                decoded.width(),
                decoded.height(),
                Pixel::YUV420P,
                target.width,
                target.height,
                scaling::Flags::BICUBIC,
            )
            .map_err(|e| SizefitError::read("create scaler", e))?;
            self.scaler = Some(scaler);
        }

        let mut scaled = frame::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .run(decoded, &mut scaled)
                .map_err(|e| SizefitError::read("scale video frame", e))?;
        }

        let orientation = self.decode.orientation;
        let mut shaped = if orientation.is_identity() {
            scaled
        } else {
            let render = self.decode.render;
            let mut oriented = frame::Video::new(Pixel::YUV420P, render.width, render.height);
            for plane in 0..scaled.planes() {
                let width = scaled.plane_width(plane) as usize;
                let height = scaled.plane_height(plane) as usize;
                let src_stride = scaled.stride(plane);
                let dst_stride = oriented.stride(plane);
                reorient_plane(
                    scaled.data(plane),
                    src_stride,
                    width,
                    height,
                    oriented.data_mut(plane),
                    dst_stride,
                    orientation,
                );
            }
            oriented
        };
        shaped.set_pts(Some(slot as i64));
        Ok(shaped)
    }
}

impl FrameReader<VideoSample> for LibavVideoReader {
    fn read(&mut self) -> SizefitResult<Option<VideoSample>> {
        loop {
            if let Some(sample) = self.pending.pop_front() {
                return Ok(Some(sample));
            }
            if self.demux.done {
                debug!(
                    "Video reader finished: {} frames admitted over {:.3}s",
                    self.gate.admitted(),
                    self.gate.duration_seconds()
                );
                return Ok(None);
            }
            self.pump()?;
        }
    }
}

/// Decodes the best audio stream into 48 kHz stereo planar float
pub(super) struct LibavAudioReader {
    demux: Demux,
    decoder: codec::decoder::Audio,
    resampler: Option<resampling::Context>,
    pending: VecDeque<AudioSample>,
}

// SAFETY: same single-lane ownership as the video reader.
unsafe impl Send for LibavAudioReader {}

impl LibavAudioReader {
    /// `None` when the source has no audio stream
    pub(super) fn open(source: &Path, trim: Option<&TrimRange>) -> SizefitResult<Option<Self>> {
        let input = open_input(source, trim)?;
        let Some((stream_index, time_base, parameters)) = input
            .streams()
            .best(media::Type::Audio)
            .map(|stream| (stream.index(), stream.time_base(), stream.parameters()))
        else {
            return Ok(None);
        };
        let decoder = codec::context::Context::from_parameters(parameters)
            .and_then(|context| context.decoder().audio())
            .map_err(|e| SizefitError::read("open audio decoder", e))?;

        debug!("Audio reader: stream {}, {} Hz", stream_index, decoder.rate());
        Ok(Some(Self {
            demux: Demux {
                input,
                stream_index,
                time_base,
                start: trim.map_or(0.0, |r| r.start),
                end: trim.map(|r| r.end),
                input_exhausted: false,
                done: false,
            },
            decoder,
            resampler: None,
            pending: VecDeque::new(),
        }))
    }

    fn pump(&mut self) -> SizefitResult<()> {
        if self.demux.input_exhausted {
            drain_decoder(self.decoder.send_eof(), "flush audio decoder")?;
            self.receive_frames()?;
            self.flush_resampler()?;
            self.demux.done = true;
            return Ok(());
        }
        if let Some(packet) = self.demux.next_packet()? {
            self.decoder
                .send_packet(&packet)
                .map_err(|e| SizefitError::read("decode audio packet", e))?;
            self.receive_frames()?;
        }
        Ok(())
    }

    fn receive_frames(&mut self) -> SizefitResult<()> {
        let mut raw = frame::Audio::empty();
        while !self.demux.done && self.decoder.receive_frame(&mut raw).is_ok() {
            let Some(timestamp) = self.demux.seconds(raw.timestamp().or(raw.pts())) else {
                self.resample(&raw, None)?;
                continue;
            };
            let length = raw.samples() as f64 / raw.rate().max(1) as f64;
            // Frames straddling the start are kept; the encoder cuts their lead-in
            if timestamp + length <= self.demux.start {
                continue;
            }
            if self.demux.end.is_some_and(|end| timestamp >= end) {
                self.demux.done = true;
                break;
            }
            self.resample(&raw, Some(timestamp))?;
        }
        Ok(())
    }

    fn resample(&mut self, raw: &frame::Audio, timestamp: Option<f64>) -> SizefitResult<()> {
        if self.resampler.is_none() {
            // Mono has to be declared explicitly or swr misreads the layout
            let source_layout = if raw.ch_layout().channels() >= 2 {
                raw.ch_layout()
            } else {
                ChannelLayout::MONO
            };
            let context = resampling::Context::get2(
                raw.format(),
                source_layout,
                raw.rate(),
                Sample::F32(SampleType::Planar),
                ChannelLayout::STEREO,
                AUDIO_SAMPLE_RATE,
            )
            .map_err(|e| SizefitError::read("create resampler", e))?;
            self.resampler = Some(context);
        }

        let capacity =
            raw.samples() * AUDIO_SAMPLE_RATE as usize / raw.rate().max(1) as usize + 256;
        let mut out =
            frame::Audio::new(Sample::F32(SampleType::Planar), capacity, ChannelLayoutMask::STEREO);
        if let Some(resampler) = self.resampler.as_mut() {
            resampler
                .run(raw, &mut out)
                .map_err(|e| SizefitError::read("resample audio", e))?;
        }
        self.push(out, timestamp);
        Ok(())
    }

    fn flush_resampler(&mut self) -> SizefitResult<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };
        let mut out =
            frame::Audio::new(Sample::F32(SampleType::Planar), 4096, ChannelLayoutMask::STEREO);
        resampler
            .flush(&mut out)
            .map_err(|e| SizefitError::read("flush resampler", e))?;
        self.push(out, None);
        Ok(())
    }

    fn push(&mut self, frame: frame::Audio, timestamp: Option<f64>) {
        if frame.samples() == 0 {
            return;
        }
        let presentation = match timestamp {
            Some(ts) => ts - self.demux.start,
            None => self
                .pending
                .back()
                .map_or(0.0, |last| {
                    last.presentation + last.frame.samples() as f64 / AUDIO_SAMPLE_RATE as f64
                }),
        };
        self.pending.push_back(AudioSample {
            frame,
            presentation,
        });
    }
}

impl FrameReader<AudioSample> for LibavAudioReader {
    fn read(&mut self) -> SizefitResult<Option<AudioSample>> {
        loop {
            if let Some(sample) = self.pending.pop_front() {
                return Ok(Some(sample));
            }
            if self.demux.done {
                return Ok(None);
            }
            self.pump()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_end_of_stream_is_ignored() {
        assert!(drain_decoder(Ok(()), "flush").is_ok());
        assert!(drain_decoder(Err(ffmpeg::Error::Eof), "flush").is_ok());
    }

    #[test]
    fn test_other_flush_errors_are_read_errors() {
        let result = drain_decoder(Err(ffmpeg::Error::InvalidData), "flush video decoder");
        match result {
            Err(SizefitError::Read(message)) => assert!(message.starts_with("flush video decoder")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
