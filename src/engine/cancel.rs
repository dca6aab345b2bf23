//! Cooperative cancellation shared between the caller and the pipeline lanes

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{SizefitError, SizefitResult};

/// Cloneable cancellation flag; every clone observes the same state
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled
    pub fn check(&self) -> SizefitResult<()> {
        if self.is_cancelled() {
            Err(SizefitError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let lane = token.clone();
        assert!(lane.check().is_ok());

        token.cancel();
        assert!(lane.is_cancelled());
        assert!(matches!(lane.check(), Err(SizefitError::Cancelled)));
    }
}
