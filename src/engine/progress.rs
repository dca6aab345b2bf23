//! Progress tracking and callback system

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::engine::PipelineState;

/// Largest fraction reported before the output is finalized
pub const ENCODING_PROGRESS_CAP: f64 = 0.95;

/// Observer of one compression call
pub trait ProgressCallback: Send + Sync {
    /// Called on every state transition
    fn on_phase(&self, _phase: PipelineState) {}

    /// Fraction complete in `[0.0, 1.0]`; never decreases within a call
    fn on_progress(&self, fraction: f64);
}

/// Adapts a plain closure into a [`ProgressCallback`]
pub struct FnProgressCallback<F>(pub F);

impl<F> ProgressCallback for FnProgressCallback<F>
where
    F: Fn(f64) + Send + Sync,
{
    fn on_progress(&self, fraction: f64) {
        (self.0)(fraction)
    }
}

/// Console progress bar on stderr for CLI usage
pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_phase(&self, phase: PipelineState) {
        if matches!(phase, PipelineState::Complete | PipelineState::Failed) {
            eprintln!();
        }
    }

    fn on_progress(&self, fraction: f64) {
        let bar_length = 30;
        let filled = ((fraction * bar_length as f64) as usize).min(bar_length);
        let bar = "#".repeat(filled) + &"-".repeat(bar_length - filled);
        eprint!("\r[{}] {:>5.1}%", bar, fraction * 100.0);
    }
}

/// JSON progress events on stderr for scripted usage
pub struct JsonProgressCallback;

impl ProgressCallback for JsonProgressCallback {
    fn on_phase(&self, phase: PipelineState) {
        let event = serde_json::json!({
            "event": "phase",
            "phase": phase,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        eprintln!("{}", event);
    }

    fn on_progress(&self, fraction: f64) {
        let event = serde_json::json!({
            "event": "progress",
            "fraction": fraction,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        eprintln!("{}", event);
    }
}

/// No-op progress callback for when progress tracking is disabled
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn on_progress(&self, _fraction: f64) {}
}

/// Thread-safe progress tracker shared by the facade and the pipeline lanes.
///
/// Reported fractions are monotonic, throttled, capped at
/// [`ENCODING_PROGRESS_CAP`] until [`finish`](Self::finish) emits the single `1.0`.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Mutex<ProgressTrackerInner>>,
    callbacks: Arc<Mutex<Vec<Arc<dyn ProgressCallback>>>>,
}

struct ProgressTrackerInner {
    phase: PipelineState,
    reported: f64,
    last_update: Option<Instant>,
    update_interval: Duration,
    finished: bool,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let inner = ProgressTrackerInner {
            phase: PipelineState::Idle,
            reported: 0.0,
            last_update: None,
            update_interval: Duration::from_millis(100),
            finished: false,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            callbacks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_callback(callback: Arc<dyn ProgressCallback>) -> Self {
        let tracker = Self::new();
        tracker.add_callback(callback);
        tracker
    }

    pub fn add_callback(&self, callback: Arc<dyn ProgressCallback>) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push(callback);
        }
    }

    /// Minimum time between two reported updates
    pub fn set_update_interval(&self, interval: Duration) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.update_interval = interval;
        }
    }

    pub fn phase(&self) -> PipelineState {
        self.inner
            .lock()
            .map(|inner| inner.phase)
            .unwrap_or(PipelineState::Failed)
    }

    /// Move to `next`; illegal transitions are ignored and logged
    pub fn advance(&self, next: PipelineState) -> bool {
        let moved = match self.inner.lock() {
            Ok(mut inner) => {
                if inner.phase.can_transition_to(next) {
                    debug!("Pipeline state {:?} -> {:?}", inner.phase, next);
                    inner.phase = next;
                    true
                } else {
                    warn!("Ignoring pipeline transition {:?} -> {:?}", inner.phase, next);
                    false
                }
            }
            Err(_) => false,
        };
        if moved {
            self.notify_callbacks(|cb| cb.on_phase(next));
        }
        moved
    }

    /// Move to `Failed` unless the call already ended
    pub fn fail(&self) {
        if !self.phase().is_terminal() {
            self.advance(PipelineState::Failed);
        }
    }

    /// Report a fraction of the encode. Values are capped, and any value not
    /// above the last reported one is dropped.
    pub fn update(&self, fraction: f64) {
        let emitted = match self.inner.lock() {
            Ok(mut inner) => {
                if inner.finished || !fraction.is_finite() {
                    return;
                }
                let fraction = fraction.clamp(0.0, ENCODING_PROGRESS_CAP);
                if fraction <= inner.reported {
                    return;
                }
                let now = Instant::now();
                let throttled = inner
                    .last_update
                    .map(|last| now.duration_since(last) < inner.update_interval)
                    .unwrap_or(false);
                if throttled && fraction < ENCODING_PROGRESS_CAP {
                    return;
                }
                inner.reported = fraction;
                inner.last_update = Some(now);
                fraction
            }
            Err(_) => return,
        };
        self.notify_callbacks(|cb| cb.on_progress(emitted));
    }

    /// Emit the final `1.0`, at most once
    pub fn finish(&self) {
        let first = match self.inner.lock() {
            Ok(mut inner) if !inner.finished => {
                inner.finished = true;
                inner.reported = 1.0;
                true
            }
            _ => false,
        };
        if first {
            self.notify_callbacks(|cb| cb.on_progress(1.0));
        }
    }

    /// Last fraction handed to the callbacks
    pub fn reported(&self) -> f64 {
        self.inner.lock().map(|inner| inner.reported).unwrap_or(0.0)
    }

    fn notify_callbacks<F>(&self, f: F)
    where
        F: Fn(&dyn ProgressCallback),
    {
        if let Ok(callbacks) = self.callbacks.lock() {
            for callback in callbacks.iter() {
                f(callback.as_ref());
            }
        }
    }
}
