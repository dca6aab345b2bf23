//! Two-lane transcode pipeline
//!
//! Each lane (video, audio) is a decode stage and an encode stage joined by a
//! bounded channel. The four stages run on the blocking pool; a full channel
//! or a busy encoder blocks the producer, which is the only backpressure.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::model::{EncodingPlan, TrimRange};
use crate::engine::cancel::CancellationToken;
use crate::engine::orientation::DecodeConfiguration;
use crate::engine::progress::ProgressTracker;
use crate::engine::PipelineState;
use crate::error::{SizefitError, SizefitResult};
use crate::output::PartialOutput;
use crate::ports::{
    FrameReader, SampleEncoder, Submission, Timestamped, TranscodeBackend, WriterSession,
};

/// Everything one pipeline run needs
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub source: PathBuf,
    /// Final location; nothing exists here unless the run succeeds
    pub destination: PathBuf,
    pub plan: EncodingPlan,
    pub decode: DecodeConfiguration,
    pub trim: Option<TrimRange>,
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub output_path: PathBuf,
    pub output_bytes: u64,
    pub video_frames: u64,
    pub audio_frames: u64,
    /// Length of the encoded video timeline
    pub encoded_duration_seconds: f64,
    pub elapsed_seconds: f64,
}

enum LaneMessage<T> {
    Item(T),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Video,
    Audio,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Video => f.write_str("video"),
            Lane::Audio => f.write_str("audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LaneReport {
    items: u64,
    bytes: u64,
    /// Presentation time of the last item written
    last_presentation: Option<f64>,
}

struct LaneHandles {
    decode: JoinHandle<SizefitResult<u64>>,
    encode: JoinHandle<SizefitResult<LaneReport>>,
}

struct LaneResults {
    decode: SizefitResult<u64>,
    encode: SizefitResult<LaneReport>,
}

/// Stops every stage: set by the caller, or by a sibling stage that failed
#[derive(Clone)]
struct StopSignal {
    cancel: CancellationToken,
    abort: CancellationToken,
}

impl StopSignal {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            abort: CancellationToken::new(),
        }
    }

    fn check(&self) -> SizefitResult<()> {
        self.cancel.check()?;
        self.abort.check()
    }

    /// Record a stage outcome, stopping the siblings on failure
    fn observe<R>(&self, result: SizefitResult<R>) -> SizefitResult<R> {
        if let Err(err) = &result {
            if !err.is_cancellation() {
                self.abort.cancel();
            }
        }
        result
    }
}

/// Decode and encode lanes for video and audio into one container
pub struct TranscodePipeline<B: TranscodeBackend> {
    backend: Arc<B>,
    channel_capacity: usize,
}

impl<B: TranscodeBackend> TranscodePipeline<B> {
    pub fn new(backend: Arc<B>, channel_capacity: usize) -> Self {
        Self {
            backend,
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Run to completion.
    ///
    /// Drives `Encoding -> Finalizing -> Complete` on `progress`, or `Failed`.
    /// On any error, including cancellation, no file is left at the
    /// destination or next to it.
    pub async fn run(
        &self,
        job: PipelineJob,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> SizefitResult<PipelineOutcome> {
        progress.advance(PipelineState::Encoding);
        match self.execute(job, progress, cancel).await {
            Ok(outcome) => {
                progress.finish();
                progress.advance(PipelineState::Complete);
                Ok(outcome)
            }
            Err(err) => {
                progress.fail();
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        job: PipelineJob,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> SizefitResult<PipelineOutcome> {
        cancel.check()?;
        let started = Instant::now();
        let partial = PartialOutput::create(&job.destination)?;
        info!(
            "Transcoding {} -> {}",
            job.source.display(),
            job.destination.display()
        );

        let (video_reader, audio_reader, session) =
            self.open(&job, partial.path().to_path_buf()).await?;
        let WriterSession {
            video: video_encoder,
            audio: audio_encoder,
            mut container,
        } = session;

        let stop = StopSignal::new(cancel.clone());
        let duration = job.plan.duration_seconds;
        let video_lane = self.spawn_lane(
            Lane::Video,
            video_reader,
            video_encoder,
            stop.clone(),
            Some((progress.clone(), duration)),
        );
        let audio_lane = audio_reader
            .zip(audio_encoder)
            .map(|(reader, encoder)| self.spawn_lane(Lane::Audio, reader, encoder, stop.clone(), None));

        // Barrier: both lanes report before the container is touched again
        let video = join_lane(video_lane).await;
        let audio = match audio_lane {
            Some(lane) => Some(join_lane(lane).await),
            None => None,
        };
        let (video_report, audio_report) = settle(cancel, video, audio)?;
        debug!(
            "Lanes done: {} video frames ({} bytes), {} audio frames ({} bytes)",
            video_report.items, video_report.bytes, audio_report.items, audio_report.bytes
        );

        cancel.check()?;
        progress.advance(PipelineState::Finalizing);
        run_blocking(move || container.finalize()).await?;

        cancel.check()?;
        let output_path = partial.commit()?;
        let output_bytes = tokio::fs::metadata(&output_path)
            .await
            .map_err(|e| SizefitError::write("stat output", e))?
            .len();

        let frame_rate = job.plan.frame_rate.max(1) as f64;
        let outcome = PipelineOutcome {
            output_path,
            output_bytes,
            video_frames: video_report.items,
            audio_frames: audio_report.items,
            // The last frame holds its slot for one frame interval
            encoded_duration_seconds: video_report
                .last_presentation
                .map_or(0.0, |last| ((last * frame_rate).round() + 1.0) / frame_rate),
            elapsed_seconds: started.elapsed().as_secs_f64(),
        };
        info!(
            "Transcode finished: {} frames, {} bytes in {:.2}s",
            outcome.video_frames, outcome.output_bytes, outcome.elapsed_seconds
        );
        Ok(outcome)
    }

    /// Open readers, build the writer, configure both encoders, then write the header
    #[allow(clippy::type_complexity)]
    async fn open(
        &self,
        job: &PipelineJob,
        output: PathBuf,
    ) -> SizefitResult<(
        Box<dyn FrameReader<B::VideoFrame>>,
        Option<Box<dyn FrameReader<B::AudioFrame>>>,
        WriterSession<B::VideoFrame, B::AudioFrame>,
    )> {
        let backend = Arc::clone(&self.backend);
        let source = job.source.clone();
        let decode = job.decode;
        let plan = job.plan.clone();
        let trim = job.trim;

        run_blocking(move || {
            let video_reader =
                backend.open_video_reader(&source, &decode, &plan, trim.as_ref())?;
            let audio_reader = match plan.audio_bitrate_bps {
                Some(_) => backend.open_audio_reader(&source, trim.as_ref())?,
                None => None,
            };

            let mut session = backend.create_writer(&output, audio_reader.is_some())?;
            session.video.configure(&plan)?;
            if let Some(audio) = session.audio.as_mut() {
                audio.configure(&plan)?;
            }
            session.container.begin()?;
            Ok((video_reader, audio_reader, session))
        })
        .await
    }

    fn spawn_lane<T>(
        &self,
        lane: Lane,
        reader: Box<dyn FrameReader<T>>,
        encoder: Box<dyn SampleEncoder<T>>,
        stop: StopSignal,
        progress: Option<(ProgressTracker, f64)>,
    ) -> LaneHandles
    where
        T: Timestamped + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let decode_stop = stop.clone();
        let decode = tokio::task::spawn_blocking(move || {
            decode_stop.observe(decode_stage(lane, reader, tx, &decode_stop))
        });
        let encode = tokio::task::spawn_blocking(move || {
            stop.observe(encode_stage(lane, rx, encoder, &stop, progress))
        });

        LaneHandles { decode, encode }
    }
}

fn decode_stage<T>(
    lane: Lane,
    mut reader: Box<dyn FrameReader<T>>,
    tx: mpsc::Sender<LaneMessage<T>>,
    stop: &StopSignal,
) -> SizefitResult<u64> {
    let mut items = 0u64;
    loop {
        stop.check()?;
        match reader.read()? {
            Some(item) => {
                // A closed channel means the encode stage already stopped
                if tx.blocking_send(LaneMessage::Item(item)).is_err() {
                    return Err(SizefitError::Cancelled);
                }
                items += 1;
            }
            None => break,
        }
    }
    tx.blocking_send(LaneMessage::End)
        .map_err(|_| SizefitError::Cancelled)?;
    debug!("{} decode stage read {} items", lane, items);
    Ok(items)
}

fn encode_stage<T: Timestamped>(
    lane: Lane,
    mut rx: mpsc::Receiver<LaneMessage<T>>,
    mut encoder: Box<dyn SampleEncoder<T>>,
    stop: &StopSignal,
    progress: Option<(ProgressTracker, f64)>,
) -> SizefitResult<LaneReport> {
    let mut items = 0u64;
    let mut last_presentation = None;
    loop {
        stop.check()?;
        let item = match rx.blocking_recv() {
            Some(LaneMessage::Item(item)) => item,
            Some(LaneMessage::End) => break,
            None => {
                stop.check()?;
                return Err(SizefitError::Read(format!(
                    "{} lane ended before its end of stream",
                    lane
                )));
            }
        };

        let pts = item.presentation_seconds();
        let mut pending = item;
        loop {
            match encoder.submit(pending)? {
                Submission::Accepted => break,
                Submission::Blocked(item) => {
                    stop.check()?;
                    encoder.wait_ready()?;
                    pending = item;
                }
            }
        }
        items += 1;
        last_presentation = Some(pts);

        if let Some((tracker, duration)) = &progress {
            if *duration > 0.0 {
                tracker.update(pts / duration);
            }
        }
    }

    stop.check()?;
    let bytes = encoder.finish()?;
    debug!("{} encode stage wrote {} items, {} bytes", lane, items, bytes);
    Ok(LaneReport {
        items,
        bytes,
        last_presentation,
    })
}

async fn join_lane(lane: LaneHandles) -> LaneResults {
    LaneResults {
        decode: flatten_join(lane.decode.await),
        encode: flatten_join(lane.encode.await),
    }
}

fn flatten_join<R>(joined: Result<SizefitResult<R>, tokio::task::JoinError>) -> SizefitResult<R> {
    joined.unwrap_or_else(|e| Err(SizefitError::Internal(format!("pipeline stage failed: {}", e))))
}

/// Reduce the four stage results to one outcome.
///
/// Caller cancellation wins. Otherwise the first real failure is reported,
/// reader failures ahead of writer failures; stages that merely stopped
/// because a sibling failed report `Cancelled` and are skipped.
fn settle(
    cancel: &CancellationToken,
    video: LaneResults,
    audio: Option<LaneResults>,
) -> SizefitResult<(LaneReport, LaneReport)> {
    if cancel.is_cancelled() {
        return Err(SizefitError::Cancelled);
    }

    let (audio_decode, audio_encode) = match audio {
        Some(results) => (results.decode, results.encode),
        None => (Ok(0), Ok(LaneReport::default())),
    };

    let mut failure: Option<SizefitError> = None;
    let mut stopped = false;
    let mut note = |err: SizefitError| {
        if err.is_cancellation() {
            stopped = true;
        } else if failure.is_none() {
            failure = Some(err);
        }
    };
    if let Err(err) = video.decode {
        note(err);
    }
    if let Err(err) = audio_decode {
        note(err);
    }
    let video_report = video.encode.map_err(&mut note).ok();
    let audio_report = audio_encode.map_err(&mut note).ok();

    if let Some(err) = failure {
        return Err(err);
    }
    match (video_report, audio_report) {
        (Some(video), Some(audio)) if !stopped => Ok((video, audio)),
        _ => Err(SizefitError::Cancelled),
    }
}

async fn run_blocking<F, R>(task: F) -> SizefitResult<R>
where
    F: FnOnce() -> SizefitResult<R> + Send + 'static,
    R: Send + 'static,
{
    flatten_join(tokio::task::spawn_blocking(task).await)
}
