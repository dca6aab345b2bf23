//! Budget solver: byte budget to encoding plan

use tracing::{debug, info};

use crate::config::BudgetConfig;
use crate::domain::model::*;
use crate::planner::gop::GopPolicy;
use crate::planner::ladder::ResolutionLadder;

/// Pure planner turning a source analysis and a byte budget into an [`EncodingPlan`]
#[derive(Debug, Clone)]
pub struct BudgetSolver {
    config: BudgetConfig,
    ladder: ResolutionLadder,
    gop: GopPolicy,
}

impl Default for BudgetSolver {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}

impl BudgetSolver {
    pub fn new(config: BudgetConfig) -> Self {
        let ladder = ResolutionLadder::new(config.ladder.clone());
        let gop = GopPolicy::new(config.max_frame_rate, config.keyframe_interval_seconds);
        Self {
            config,
            ladder,
            gop,
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Audio reserve for the source, 0 when it is silent
    pub fn audio_allowance_bps(&self, analysis: &SourceAnalysis) -> u64 {
        if analysis.has_audio_track {
            self.config.audio_bitrate_bps
        } else {
            0
        }
    }

    /// `target_bytes * 8 / duration - audio`, before clamping.
    ///
    /// A non-positive duration gives no rate to work with, so the ceiling is used.
    pub fn ideal_video_bitrate(&self, target_bytes: u64, duration: f64, audio_bps: u64) -> f64 {
        if !duration.is_finite() || duration <= 0.0 {
            return self.config.max_bitrate_bps as f64;
        }
        (target_bytes as f64 * 8.0 / duration) - audio_bps as f64
    }

    /// Clamp a bitrate into `[min_bitrate_bps, max_bitrate_bps]`
    pub fn clamp_bitrate(&self, ideal: f64) -> u64 {
        let floor = self.config.min_bitrate_bps as f64;
        let ceiling = self.config.max_bitrate_bps as f64;
        if ideal.is_nan() {
            return self.config.min_bitrate_bps;
        }
        ideal.clamp(floor, ceiling).round() as u64
    }

    pub fn codec_for(&self, bitrate_bps: u64) -> VideoCodec {
        if bitrate_bps < self.config.hevc_below_bps {
            VideoCodec::Hevc
        } else {
            VideoCodec::H264
        }
    }

    /// Solve the plan for one call.
    ///
    /// The budget is spread over the selected duration, which is the trim
    /// length when a trim is given.
    pub fn plan(
        &self,
        analysis: &SourceAnalysis,
        target_bytes: u64,
        preserve_resolution: bool,
        trim: Option<&TrimRange>,
    ) -> EncodingPlan {
        let duration = analysis.selected_duration(trim);
        let audio_bps = self.audio_allowance_bps(analysis);
        let ideal = self.ideal_video_bitrate(target_bytes, duration, audio_bps);
        let target_bitrate_bps = self.clamp_bitrate(ideal);
        debug!(
            ideal_bps = ideal,
            target_bitrate_bps, audio_bps, duration, "Solved video bitrate"
        );

        let display_resolution = if preserve_resolution {
            analysis.display_resolution.even_floor()
        } else {
            self.ladder
                .select(analysis.display_resolution, target_bitrate_bps)
        };
        // Orientation is baked in at decode, so the encoder sees display-oriented buffers
        let writer_resolution = display_resolution.even_floor();

        let frame_rate = self.gop.output_frame_rate(analysis.frame_rate);
        let plan = EncodingPlan {
            target_bitrate_bps,
            display_resolution,
            writer_resolution,
            frame_rate,
            codec: self.codec_for(target_bitrate_bps),
            key_frame_interval_frames: self.gop.keyframe_interval(frame_rate),
            audio_bitrate_bps: analysis.has_audio_track.then_some(audio_bps),
            duration_seconds: duration,
        };

        info!(
            "Planned {} at {} bps, {} @ {} fps (GOP {})",
            plan.codec,
            plan.target_bitrate_bps,
            plan.writer_resolution,
            plan.frame_rate,
            plan.key_frame_interval_frames
        );
        plan
    }
}
