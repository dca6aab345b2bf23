//! In-memory media backend and probe for exercising the pipeline without libav

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sizefit::domain::model::*;
use sizefit::engine::{CancellationToken, DecodeConfiguration, PipelineState, ProgressCallback};
use sizefit::error::{SizefitError, SizefitResult};
use sizefit::ports::*;

pub const MB: u64 = 1024 * 1024;

/// Bytes each fake encoder writes per item
pub const BYTES_PER_FRAME: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct FakeFrame {
    pub seconds: f64,
}

impl Timestamped for FakeFrame {
    fn presentation_seconds(&self) -> f64 {
        self.seconds
    }
}

/// Knobs for one fake backend
#[derive(Clone, Default)]
pub struct FakeBehavior {
    /// Video reader fails when asked for this frame index
    pub fail_video_read_at: Option<u64>,
    /// Video encoder fails on this frame index
    pub fail_write_at: Option<u64>,
    /// Token cancelled by the video reader once it reaches this index
    pub cancel_at: Option<(u64, CancellationToken)>,
    /// Video encoder reports `Blocked` before accepting every item
    pub backpressure: bool,
    /// Video frames from this index on are shifted later by this many seconds
    pub video_gap: Option<(u64, f64)>,
}

/// Backend whose readers synthesize frames for a source of `duration` seconds
pub struct FakeBackend {
    pub duration: f64,
    pub behavior: FakeBehavior,
    pub audio_frames_written: Arc<AtomicU64>,
    pub blocked_submissions: Arc<AtomicU64>,
}

impl FakeBackend {
    pub fn new(duration: f64) -> Self {
        Self::with_behavior(duration, FakeBehavior::default())
    }

    pub fn with_behavior(duration: f64, behavior: FakeBehavior) -> Self {
        Self {
            duration,
            behavior,
            audio_frames_written: Arc::new(AtomicU64::new(0)),
            blocked_submissions: Arc::new(AtomicU64::new(0)),
        }
    }

    fn range(&self, trim: Option<&TrimRange>) -> (f64, f64) {
        match trim {
            Some(range) => (range.start, range.end.min(self.duration)),
            None => (0.0, self.duration),
        }
    }
}

struct SyntheticReader {
    start: f64,
    end: f64,
    rate: f64,
    next: u64,
    fail_at: Option<u64>,
    cancel_at: Option<(u64, CancellationToken)>,
    gap: Option<(u64, f64)>,
}

impl FrameReader<FakeFrame> for SyntheticReader {
    fn read(&mut self) -> SizefitResult<Option<FakeFrame>> {
        if self.fail_at == Some(self.next) {
            return Err(SizefitError::Read("corrupt packet".to_string()));
        }
        if let Some((index, token)) = &self.cancel_at {
            if *index == self.next {
                token.cancel();
            }
        }
        let shift = match self.gap {
            Some((from, seconds)) if self.next >= from => seconds,
            _ => 0.0,
        };
        let seconds = self.next as f64 / self.rate + shift;
        if self.start + seconds >= self.end {
            return Ok(None);
        }
        self.next += 1;
        Ok(Some(FakeFrame { seconds }))
    }
}

struct MemoryEncoder {
    sink: Arc<Mutex<Vec<u8>>>,
    written: u64,
    fail_at: Option<u64>,
    backpressure: bool,
    ready: bool,
    blocked: Arc<AtomicU64>,
    counter: Option<Arc<AtomicU64>>,
}

impl SampleEncoder<FakeFrame> for MemoryEncoder {
    fn configure(&mut self, plan: &EncodingPlan) -> SizefitResult<()> {
        if plan.writer_resolution.width % 2 != 0 || plan.writer_resolution.height % 2 != 0 {
            return Err(SizefitError::Write("odd frame size".to_string()));
        }
        Ok(())
    }

    fn submit(&mut self, item: FakeFrame) -> SizefitResult<Submission<FakeFrame>> {
        if self.backpressure && !self.ready {
            self.blocked.fetch_add(1, Ordering::SeqCst);
            return Ok(Submission::Blocked(item));
        }
        self.ready = false;
        if self.fail_at == Some(self.written) {
            return Err(SizefitError::Write("encoder rejected frame".to_string()));
        }
        self.sink
            .lock()
            .unwrap()
            .extend(std::iter::repeat(0u8).take(BYTES_PER_FRAME));
        self.written += 1;
        if let Some(counter) = &self.counter {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Submission::Accepted)
    }

    fn wait_ready(&mut self) -> SizefitResult<()> {
        self.ready = true;
        Ok(())
    }

    fn finish(&mut self) -> SizefitResult<u64> {
        Ok(self.written * BYTES_PER_FRAME as u64)
    }
}

struct MemoryContainer {
    path: std::path::PathBuf,
    sink: Arc<Mutex<Vec<u8>>>,
    started: bool,
}

impl OutputContainer for MemoryContainer {
    fn begin(&mut self) -> SizefitResult<()> {
        self.started = true;
        Ok(())
    }

    fn finalize(&mut self) -> SizefitResult<()> {
        if !self.started {
            return Err(SizefitError::Write("trailer before header".to_string()));
        }
        let bytes = self.sink.lock().unwrap().clone();
        std::fs::write(&self.path, bytes).map_err(|e| SizefitError::Write(e.to_string()))
    }
}

impl TranscodeBackend for FakeBackend {
    type VideoFrame = FakeFrame;
    type AudioFrame = FakeFrame;

    fn open_video_reader(
        &self,
        _source: &Path,
        _decode: &DecodeConfiguration,
        plan: &EncodingPlan,
        trim: Option<&TrimRange>,
    ) -> SizefitResult<Box<dyn FrameReader<FakeFrame>>> {
        let (start, end) = self.range(trim);
        Ok(Box::new(SyntheticReader {
            start,
            end,
            rate: plan.frame_rate as f64,
            next: 0,
            fail_at: self.behavior.fail_video_read_at,
            cancel_at: self.behavior.cancel_at.clone(),
            gap: self.behavior.video_gap,
        }))
    }

    fn open_audio_reader(
        &self,
        _source: &Path,
        trim: Option<&TrimRange>,
    ) -> SizefitResult<Option<Box<dyn FrameReader<FakeFrame>>>> {
        let (start, end) = self.range(trim);
        // 1024-sample AAC frames at 48 kHz
        Ok(Some(Box::new(SyntheticReader {
            start,
            end,
            rate: 48_000.0 / 1024.0,
            next: 0,
            fail_at: None,
            cancel_at: None,
            gap: None,
        })))
    }

    fn create_writer(
        &self,
        output: &Path,
        with_audio: bool,
    ) -> SizefitResult<WriterSession<FakeFrame, FakeFrame>> {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let video = Box::new(MemoryEncoder {
            sink: Arc::clone(&sink),
            written: 0,
            fail_at: self.behavior.fail_write_at,
            backpressure: self.behavior.backpressure,
            ready: false,
            blocked: Arc::clone(&self.blocked_submissions),
            counter: None,
        });
        let audio = with_audio.then(|| {
            Box::new(MemoryEncoder {
                sink: Arc::clone(&sink),
                written: 0,
                fail_at: None,
                backpressure: false,
                ready: false,
                blocked: Arc::clone(&self.blocked_submissions),
                counter: Some(Arc::clone(&self.audio_frames_written)),
            }) as Box<dyn SampleEncoder<FakeFrame>>
        });
        Ok(WriterSession {
            video,
            audio,
            container: Box::new(MemoryContainer {
                path: output.to_path_buf(),
                sink,
                started: false,
            }),
        })
    }
}

/// Probe returning a fixed analysis, whatever the file holds
pub struct FakeProbe {
    pub analysis: SourceAnalysis,
}

#[async_trait]
impl ProbePort for FakeProbe {
    async fn analyze(&self, _source: &Path) -> SizefitResult<SourceAnalysis> {
        Ok(self.analysis.clone())
    }
}

pub fn landscape_source(duration: f64, size: u64, audio: bool) -> SourceAnalysis {
    let natural = Resolution::new(1920, 1080).unwrap();
    SourceAnalysis::new(
        duration,
        size,
        natural,
        AffineTransform::identity(),
        30.0,
        size as f64 * 8.0 / duration,
        audio,
    )
    .unwrap()
}

/// Records every fraction and phase it sees
#[derive(Default)]
pub struct Recorder {
    pub fractions: Mutex<Vec<f64>>,
    pub phases: Mutex<Vec<PipelineState>>,
}

impl ProgressCallback for Recorder {
    fn on_phase(&self, phase: PipelineState) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_progress(&self, fraction: f64) {
        self.fractions.lock().unwrap().push(fraction);
    }
}

/// Names of all entries in `dir`
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
