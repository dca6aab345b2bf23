// Ports - Interface definitions (contracts)

use std::path::Path;

use async_trait::async_trait;

use crate::domain::model::*;
use crate::engine::DecodeConfiguration;
use crate::error::SizefitResult;

/// Port for media file probing and analysis
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Read-only analysis of a source; `NoVideoTrack` when nothing decodable is found
    async fn analyze(&self, source: &Path) -> SizefitResult<SourceAnalysis>;
}

/// Anything placed on a presentation timeline
pub trait Timestamped {
    /// Presentation time in seconds, relative to the start of the selected range
    fn presentation_seconds(&self) -> f64;
}

/// Pull side of a lane: yields decoded items in presentation order
pub trait FrameReader<T>: Send {
    /// Next item, or `None` once the selected range is exhausted
    fn read(&mut self) -> SizefitResult<Option<T>>;
}

/// Answer of an encoder to one submitted item
#[derive(Debug)]
pub enum Submission<T> {
    Accepted,
    /// Encoder is full; the item is handed back to resubmit after [`SampleEncoder::wait_ready`]
    Blocked(T),
}

/// Push side of a lane: an encoder feeding the shared output container.
///
/// Concurrent calls serialize inside implementations, not in the pipeline.
pub trait SampleEncoder<T>: Send {
    fn configure(&mut self, plan: &EncodingPlan) -> SizefitResult<()>;

    fn submit(&mut self, item: T) -> SizefitResult<Submission<T>>;

    /// Block until the encoder can take more input
    fn wait_ready(&mut self) -> SizefitResult<()>;

    /// Flush pending output; returns the bytes this encoder produced
    fn finish(&mut self) -> SizefitResult<u64>;
}

/// The one container both lanes write into
pub trait OutputContainer: Send {
    /// Called once both encoders are configured
    fn begin(&mut self) -> SizefitResult<()>;

    /// Close the container after both lanes finished
    fn finalize(&mut self) -> SizefitResult<()>;
}

/// Encoders and container for one output file
pub struct WriterSession<V, A> {
    pub video: Box<dyn SampleEncoder<V>>,
    pub audio: Option<Box<dyn SampleEncoder<A>>>,
    pub container: Box<dyn OutputContainer>,
}

/// Media backend the pipeline drives
pub trait TranscodeBackend: Send + Sync + 'static {
    type VideoFrame: Timestamped + Send + 'static;
    type AudioFrame: Timestamped + Send + 'static;

    /// Reader yielding display-oriented frames at the decode configuration's
    /// render size, on a `1 / plan.frame_rate` timeline, restricted to `trim`
    fn open_video_reader(
        &self,
        source: &Path,
        decode: &DecodeConfiguration,
        plan: &EncodingPlan,
        trim: Option<&TrimRange>,
    ) -> SizefitResult<Box<dyn FrameReader<Self::VideoFrame>>>;

    /// Reader over the original audio within `trim`; `None` when the source is silent
    fn open_audio_reader(
        &self,
        source: &Path,
        trim: Option<&TrimRange>,
    ) -> SizefitResult<Option<Box<dyn FrameReader<Self::AudioFrame>>>>;

    /// Open the output container at `output`
    fn create_writer(
        &self,
        output: &Path,
        with_audio: bool,
    ) -> SizefitResult<WriterSession<Self::VideoFrame, Self::AudioFrame>>;
}
