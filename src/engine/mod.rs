//! Transcode engine: orientation baking, the two-lane pipeline, progress and cancellation

use serde::{Deserialize, Serialize};

pub mod cancel;
pub mod copy;
pub mod orientation;
pub mod pipeline;
pub mod progress;

pub use cancel::CancellationToken;
pub use orientation::{DecodeConfiguration, OrientationNormalizer};
pub use pipeline::{PipelineJob, PipelineOutcome, TranscodePipeline};
pub use progress::{ProgressCallback, ProgressTracker};

/// State of one compression call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Analyzing,
    Encoding,
    Finalizing,
    Complete,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Failed)
    }

    /// Forward-only transitions. `Idle -> Encoding` runs a pipeline on a
    /// prepared plan; `Analyzing -> Complete` is the passthrough copy.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, Analyzing) | (Idle, Encoding) => true,
            (Analyzing, Encoding) | (Analyzing, Complete) => true,
            (Encoding, Finalizing) => true,
            (Finalizing, Complete) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Caps a decoded frame sequence to a target frame rate.
///
/// Each frame lands on the output slot nearest its source timestamp; a frame
/// whose slot is already taken is dropped. Slots follow the source clock, so
/// fractional rates and capture gaps keep their timing.
#[derive(Debug, Clone)]
pub struct FrameRateGate {
    frame_rate: f64,
    last_slot: Option<u64>,
    admitted: u64,
}

/// Ties at exactly half a slot go to the earlier slot
const SLOT_TIE_BIAS: f64 = 1e-6;

impl FrameRateGate {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            frame_rate: frame_rate.max(1) as f64,
            last_slot: None,
            admitted: 0,
        }
    }

    /// Output slot for a frame at `timestamp` seconds (relative to the range
    /// start), or `None` when it should be dropped
    pub fn admit(&mut self, timestamp: f64) -> Option<u64> {
        let slot = (timestamp.max(0.0) * self.frame_rate - SLOT_TIE_BIAS)
            .round()
            .max(0.0) as u64;
        if self.last_slot.is_some_and(|last| slot <= last) {
            return None;
        }
        self.last_slot = Some(slot);
        self.admitted += 1;
        Some(slot)
    }

    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    /// Slot that follows the last admitted frame
    pub fn next_slot(&self) -> u64 {
        self.last_slot.map_or(0, |last| last + 1)
    }

    /// Length of the emitted timeline in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.next_slot() as f64 / self.frame_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_is_forward_only() {
        use PipelineState::*;
        assert!(Idle.can_transition_to(Analyzing));
        assert!(Analyzing.can_transition_to(Encoding));
        assert!(Encoding.can_transition_to(Finalizing));
        assert!(Finalizing.can_transition_to(Complete));
        assert!(Encoding.can_transition_to(Failed));
        assert!(!Complete.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
        assert!(!Encoding.can_transition_to(Analyzing));
        assert!(!Encoding.can_transition_to(Complete));
    }

    #[test]
    fn test_gate_halves_60_fps() {
        let mut gate = FrameRateGate::new(30);
        let kept: Vec<u64> = (0..60)
            .filter_map(|i| gate.admit(i as f64 / 60.0))
            .collect();
        assert_eq!(kept, (0..30).collect::<Vec<_>>());
        assert!((gate.duration_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_gate_keeps_matching_rate() {
        let mut gate = FrameRateGate::new(30);
        let kept = (0..300)
            .filter(|i| gate.admit(*i as f64 * (1001.0 / 30000.0)).is_some())
            .count();
        assert_eq!(kept, 300);
    }

    #[test]
    fn test_ntsc_source_stays_on_its_clock() {
        let mut gate = FrameRateGate::new(30);
        let interval = 1.0 / 30.0;
        let mut last = 0.0;
        // Ten minutes at 29.97 fps
        for i in 0..17_982u64 {
            let source = i as f64 * 1001.0 / 30000.0;
            let slot = gate.admit(source).unwrap();
            let stamped = slot as f64 / 30.0;
            assert!(
                (source - stamped).abs() < interval,
                "frame {} at {:.3}s stamped at {:.3}s",
                i,
                source,
                stamped
            );
            last = source;
        }
        assert_eq!(gate.admitted(), 17_982);
        assert!((gate.duration_seconds() - last).abs() < 2.0 * interval);
    }

    #[test]
    fn test_capture_gap_is_kept_on_the_timeline() {
        let mut gate = FrameRateGate::new(30);
        let before: Vec<f64> = (0..60).map(|i| i as f64 / 30.0).collect();
        let after: Vec<f64> = (0..60).map(|i| 4.0 + i as f64 / 30.0).collect();

        for source in before.iter().chain(after.iter()) {
            let slot = gate.admit(*source).unwrap();
            assert!((source - slot as f64 / 30.0).abs() < 1.0 / 30.0);
        }
        assert_eq!(gate.admitted(), 120);
        assert_eq!(gate.next_slot(), 180);
    }

    #[test]
    fn test_gate_ignores_frames_behind_the_last_slot() {
        let mut gate = FrameRateGate::new(30);
        assert_eq!(gate.admit(0.5), Some(15));
        assert_eq!(gate.admit(0.49), None);
        assert_eq!(gate.admit(-0.2), None);
        assert_eq!(gate.admit(0.54), Some(16));
    }
}
