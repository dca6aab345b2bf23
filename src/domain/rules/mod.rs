// Domain rules - Business logic and policies

use tracing::debug;

use crate::domain::model::*;
use crate::error::{SizefitError, SizefitResult};


/// Outcome of comparing a source against its byte budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    /// Source already fits; copy it unchanged
    Passthrough,
    /// Source must be re-encoded
    Transcode,
}

/// Business rules applied before any media is touched
pub struct CompressionPolicy;

impl CompressionPolicy {
    /// Reject requests that can never succeed
    pub fn validate_request(request: &CompressRequest) -> SizefitResult<()> {
        if request.target_bytes == 0 {
            return Err(SizefitError::InvalidRequest(
                "Target size must be greater than zero".to_string(),
            ));
        }
        if let Some(output) = &request.output {
            if output == &request.source {
                return Err(SizefitError::InvalidRequest(
                    "Output path must differ from the source".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Decide between copying and transcoding.
    ///
    /// A trimmed request is always transcoded since a copy cannot honor it.
    pub fn decide(
        analysis: &SourceAnalysis,
        target_bytes: u64,
        trim: Option<&TrimRange>,
    ) -> BudgetDecision {
        let decision = if trim.is_none() && analysis.file_size_bytes <= target_bytes {
            BudgetDecision::Passthrough
        } else {
            BudgetDecision::Transcode
        };
        debug!(
            source_bytes = analysis.file_size_bytes,
            target_bytes,
            trimmed = trim.is_some(),
            ?decision,
            "Budget decision"
        );
        decision
    }

    /// Clamp an optional trim against the analysed duration
    pub fn resolve_trim(
        analysis: &SourceAnalysis,
        trim: Option<&TrimRange>,
    ) -> SizefitResult<Option<TrimRange>> {
        trim.map(|range| range.clamp_to(analysis.duration_seconds))
            .transpose()
    }
}
