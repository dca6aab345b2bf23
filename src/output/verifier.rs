//! Post-run output verification

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How the produced file compares with its budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub size_bytes: u64,
    pub target_bytes: u64,
    /// `size / target`
    pub budget_ratio: f64,
    pub within_tolerance: bool,
}

/// Flags outputs that overshoot their budget by more than the tolerance.
///
/// An overshoot is reported, not treated as a failure: the bitrate floor
/// makes some budgets unreachable by construction.
#[derive(Debug, Clone)]
pub struct OutputVerifier {
    tolerance: f64,
}

impl OutputVerifier {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn verify(&self, size_bytes: u64, target_bytes: u64) -> VerificationReport {
        let budget_ratio = if target_bytes == 0 {
            f64::INFINITY
        } else {
            size_bytes as f64 / target_bytes as f64
        };
        let report = VerificationReport {
            size_bytes,
            target_bytes,
            budget_ratio,
            within_tolerance: budget_ratio <= 1.0 + self.tolerance,
        };

        if report.within_tolerance {
            info!(
                "Output is {} bytes ({:.1}% of budget)",
                size_bytes,
                budget_ratio * 100.0
            );
        } else {
            warn!(
                "Output is {} bytes, {:.1}% of the {} byte budget (tolerance {:.0}%)",
                size_bytes,
                budget_ratio * 100.0,
                target_bytes,
                self.tolerance * 100.0
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_boundary() {
        let verifier = OutputVerifier::new(0.10);
        assert!(verifier.verify(110, 100).within_tolerance);
        assert!(!verifier.verify(111, 100).within_tolerance);
        assert!(verifier.verify(10, 100).within_tolerance);
    }

    #[test]
    fn test_ratio() {
        let report = OutputVerifier::new(0.1).verify(2048, 1024);
        assert_eq!(report.budget_ratio, 2.0);
        assert!(!report.within_tolerance);
        assert!(!OutputVerifier::new(0.1).verify(1, 0).within_tolerance);
    }
}
