// Compress interactor - Orchestrates probe, budget solve and transcode

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::SizefitConfig;
use crate::domain::model::*;
use crate::domain::rules::*;
use crate::engine::copy::PassthroughCopier;
use crate::engine::{
    CancellationToken, OrientationNormalizer, PipelineJob, PipelineState, ProgressTracker,
    TranscodePipeline,
};
use crate::error::{SizefitError, SizefitResult};
use crate::output::{OutputTarget, OutputVerifier};
use crate::planner::BudgetSolver;
use crate::ports::*;

/// Dry-run answer: what `compress` would do with a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPreview {
    pub analysis: SourceAnalysis,
    pub passthrough: bool,
    pub trim: Option<TrimRange>,
    /// Absent for passthrough
    pub plan: Option<EncodingPlan>,
}

/// Public entry point: one `compress` call per output file.
///
/// Holds no per-call state, so concurrent calls on different sources are independent.
pub struct Compressor<B: TranscodeBackend> {
    probe_port: Arc<dyn ProbePort>,
    pipeline: TranscodePipeline<B>,
    solver: BudgetSolver,
    verifier: OutputVerifier,
    copier: PassthroughCopier,
    output_dir: PathBuf,
}

impl<B: TranscodeBackend> Compressor<B> {
    /// Create new compressor with injected ports
    pub fn new(probe_port: Arc<dyn ProbePort>, backend: Arc<B>, config: &SizefitConfig) -> Self {
        Self {
            probe_port,
            pipeline: TranscodePipeline::new(backend, config.pipeline.channel_capacity),
            solver: BudgetSolver::new(config.budget.clone()),
            verifier: OutputVerifier::new(config.pipeline.budget_tolerance),
            copier: PassthroughCopier::new(),
            output_dir: config.pipeline.output_dir(),
        }
    }

    /// Fit `request.source` into `request.target_bytes`.
    ///
    /// Sources already within budget (and untrimmed) are copied unchanged.
    /// Any failure, including cancellation, leaves no output file behind.
    pub async fn compress(
        &self,
        request: CompressRequest,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> SizefitResult<CompressionResult> {
        let started = Instant::now();
        progress.advance(PipelineState::Analyzing);
        let result = self.run(request, progress, cancel, started).await;
        match &result {
            Ok(done) => info!(
                "Compressed to {} ({} -> {} bytes, ratio {:.2}) in {:.2}s",
                done.output_path.display(),
                done.original_size_bytes,
                done.compressed_size_bytes,
                done.compression_ratio,
                done.wall_clock_seconds
            ),
            Err(err) if err.is_cancellation() => info!("Compression cancelled"),
            Err(err) => error!("Compression failed: {}", err),
        }
        if result.is_err() {
            progress.fail();
        }
        result
    }

    async fn run(
        &self,
        request: CompressRequest,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
        started: Instant,
    ) -> SizefitResult<CompressionResult> {
        CompressionPolicy::validate_request(&request)?;
        cancel.check()?;
        let analysis = self.analyze(&request.source).await?;
        cancel.check()?;

        let trim = CompressionPolicy::resolve_trim(&analysis, request.trim.as_ref())?;
        let target =
            OutputTarget::resolve(request.output.as_deref(), &request.source, &self.output_dir)?;

        match CompressionPolicy::decide(&analysis, request.target_bytes, trim.as_ref()) {
            BudgetDecision::Passthrough => {
                let (_, bytes) = self
                    .copier
                    .copy(&request.source, target.path(), cancel)
                    .await?;
                progress.finish();
                progress.advance(PipelineState::Complete);

                Ok(CompressionResult {
                    output_path: target.release(),
                    original_size_bytes: analysis.file_size_bytes,
                    compressed_size_bytes: bytes,
                    compression_ratio: 1.0,
                    source_duration_seconds: analysis.duration_seconds,
                    wall_clock_seconds: started.elapsed().as_secs_f64(),
                    codec: OutputCodec::Passthrough,
                    resolution: analysis.display_resolution,
                    bitrate_bps: analysis.estimated_bitrate_bps.round() as u64,
                    frame_rate: None,
                    trimmed: false,
                    completed_at: Utc::now(),
                })
            }
            BudgetDecision::Transcode => {
                let plan = self.solver.plan(
                    &analysis,
                    request.target_bytes,
                    request.preserve_resolution,
                    trim.as_ref(),
                );
                let decode = OrientationNormalizer::configure(&analysis, &plan);
                let job = PipelineJob {
                    source: request.source.clone(),
                    destination: target.path().to_path_buf(),
                    plan: plan.clone(),
                    decode,
                    trim,
                };

                let outcome = self.pipeline.run(job, progress, cancel).await?;
                let output_path = target.release();
                self.verifier
                    .verify(outcome.output_bytes, request.target_bytes);

                Ok(CompressionResult {
                    output_path,
                    original_size_bytes: analysis.file_size_bytes,
                    compressed_size_bytes: outcome.output_bytes,
                    compression_ratio: CompressionResult::ratio(
                        analysis.file_size_bytes,
                        outcome.output_bytes,
                    ),
                    source_duration_seconds: outcome.encoded_duration_seconds,
                    wall_clock_seconds: started.elapsed().as_secs_f64(),
                    codec: plan.codec.into(),
                    resolution: plan.writer_resolution,
                    bitrate_bps: plan.target_bitrate_bps,
                    frame_rate: Some(plan.frame_rate),
                    trimmed: trim.is_some(),
                    completed_at: Utc::now(),
                })
            }
        }
    }

    /// Probe and solve without writing anything
    pub async fn plan(
        &self,
        source: &Path,
        target_bytes: u64,
        preserve_resolution: bool,
        trim: Option<TrimRange>,
    ) -> SizefitResult<PlanPreview> {
        let mut request = CompressRequest::new(source, target_bytes);
        request.preserve_resolution = preserve_resolution;
        request.trim = trim;
        CompressionPolicy::validate_request(&request)?;

        let analysis = self.analyze(source).await?;
        let trim = CompressionPolicy::resolve_trim(&analysis, trim.as_ref())?;
        let passthrough = CompressionPolicy::decide(&analysis, target_bytes, trim.as_ref())
            == BudgetDecision::Passthrough;
        let plan = (!passthrough).then(|| {
            self.solver
                .plan(&analysis, target_bytes, preserve_resolution, trim.as_ref())
        });

        Ok(PlanPreview {
            analysis,
            passthrough,
            trim,
            plan,
        })
    }

    async fn analyze(&self, source: &Path) -> SizefitResult<SourceAnalysis> {
        ensure_source(source).await?;
        self.probe_port.analyze(source).await
    }
}

/// Readable regular file, or `SourceNotFound`
pub(crate) async fn ensure_source(source: &Path) -> SizefitResult<()> {
    match tokio::fs::metadata(source).await {
        Ok(metadata) if metadata.is_file() => Ok(()),
        _ => Err(SizefitError::SourceNotFound {
            path: source.display().to_string(),
        }),
    }
}
