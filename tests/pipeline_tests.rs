//! Transcode pipeline against an in-memory backend

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::*;
use sizefit::domain::model::TrimRange;
use sizefit::engine::{
    CancellationToken, OrientationNormalizer, PipelineJob, PipelineState, ProgressTracker,
    TranscodePipeline,
};
use sizefit::error::SizefitError;
use sizefit::planner::BudgetSolver;

fn job(dir: &TempDir, duration: f64, audio: bool, trim: Option<TrimRange>) -> PipelineJob {
    let analysis = landscape_source(duration, 100 * MB, audio);
    let plan = BudgetSolver::default().plan(&analysis, 5 * MB, false, trim.as_ref());
    PipelineJob {
        source: dir.path().join("source.mov"),
        destination: dir.path().join("out.mp4"),
        decode: OrientationNormalizer::configure(&analysis, &plan),
        plan,
        trim,
    }
}

fn recording_tracker() -> (ProgressTracker, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let tracker = ProgressTracker::with_callback(recorder.clone());
    tracker.set_update_interval(Duration::ZERO);
    (tracker, recorder)
}

#[tokio::test]
async fn test_trimmed_run_encodes_selected_range() {
    let dir = TempDir::new().unwrap();
    let trim = TrimRange::new(2.0, 7.0).unwrap();
    let job = job(&dir, 10.0, true, Some(trim));
    let destination = job.destination.clone();

    let backend = Arc::new(FakeBackend::new(10.0));
    let pipeline = TranscodePipeline::new(Arc::clone(&backend), 4);
    let (tracker, _) = recording_tracker();

    let outcome = pipeline
        .run(job, &tracker, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.video_frames, 150);
    assert!((outcome.encoded_duration_seconds - 5.0).abs() < 1e-9);
    assert_eq!(outcome.output_path, destination);
    assert!(outcome.audio_frames > 0);
    assert_eq!(
        outcome.output_bytes,
        (outcome.video_frames + outcome.audio_frames) * BYTES_PER_FRAME as u64
    );
    assert_eq!(dir_entries(dir.path()), vec!["out.mp4".to_string()]);
}

#[tokio::test]
async fn test_silent_source_has_no_audio_lane() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::new(3.0));
    let pipeline = TranscodePipeline::new(Arc::clone(&backend), 8);
    let (tracker, _) = recording_tracker();

    let outcome = pipeline
        .run(job(&dir, 3.0, false, None), &tracker, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.audio_frames, 0);
    assert_eq!(backend.audio_frames_written.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.video_frames, 90);
}

#[tokio::test]
async fn test_capture_gap_counts_toward_duration() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::with_behavior(
        3.0,
        FakeBehavior {
            video_gap: Some((30, 1.0)),
            ..Default::default()
        },
    ));
    let pipeline = TranscodePipeline::new(backend, 4);
    let (tracker, _) = recording_tracker();

    let outcome = pipeline
        .run(job(&dir, 3.0, false, None), &tracker, &CancellationToken::new())
        .await
        .unwrap();

    // One second of video is missing, but the timeline still spans three
    assert_eq!(outcome.video_frames, 60);
    assert!((outcome.encoded_duration_seconds - 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_one() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::new(4.0));
    let pipeline = TranscodePipeline::new(backend, 2);
    let (tracker, recorder) = recording_tracker();

    pipeline
        .run(job(&dir, 4.0, true, None), &tracker, &CancellationToken::new())
        .await
        .unwrap();

    let fractions = recorder.fractions.lock().unwrap().clone();
    assert!(fractions.len() > 2);
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
    assert_eq!(fractions.last(), Some(&1.0));
    assert_eq!(fractions.iter().filter(|f| **f == 1.0).count(), 1);
    assert!(fractions[..fractions.len() - 1].iter().all(|f| *f <= 0.95));

    assert_eq!(
        recorder.phases.lock().unwrap().clone(),
        vec![
            PipelineState::Encoding,
            PipelineState::Finalizing,
            PipelineState::Complete
        ]
    );
}

#[tokio::test]
async fn test_busy_encoder_is_waited_on() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::with_behavior(
        2.0,
        FakeBehavior {
            backpressure: true,
            ..Default::default()
        },
    ));
    let pipeline = TranscodePipeline::new(Arc::clone(&backend), 1);
    let (tracker, _) = recording_tracker();

    let outcome = pipeline
        .run(job(&dir, 2.0, false, None), &tracker, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.video_frames, 60);
    assert_eq!(backend.blocked_submissions.load(Ordering::SeqCst), 60);
}

#[tokio::test]
async fn test_write_failure_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::with_behavior(
        10.0,
        FakeBehavior {
            fail_write_at: Some(10),
            ..Default::default()
        },
    ));
    let pipeline = TranscodePipeline::new(backend, 4);
    let (tracker, _) = recording_tracker();

    let result = pipeline
        .run(job(&dir, 10.0, true, None), &tracker, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SizefitError::Write(_))));
    assert!(dir_entries(dir.path()).is_empty());
    assert_eq!(tracker.phase(), PipelineState::Failed);
}

#[tokio::test]
async fn test_reader_failure_surfaces_as_read_error() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::with_behavior(
        10.0,
        FakeBehavior {
            fail_video_read_at: Some(5),
            ..Default::default()
        },
    ));
    let pipeline = TranscodePipeline::new(backend, 4);
    let (tracker, _) = recording_tracker();

    let result = pipeline
        .run(job(&dir, 10.0, true, None), &tracker, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SizefitError::Read(_))));
    assert!(dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancellation_mid_run_cleans_up() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let backend = Arc::new(FakeBackend::with_behavior(
        30.0,
        FakeBehavior {
            cancel_at: Some((20, cancel.clone())),
            ..Default::default()
        },
    ));
    let pipeline = TranscodePipeline::new(backend, 4);
    let (tracker, recorder) = recording_tracker();

    let result = pipeline.run(job(&dir, 30.0, true, None), &tracker, &cancel).await;

    assert!(matches!(result, Err(SizefitError::Cancelled)));
    assert!(dir_entries(dir.path()).is_empty());
    assert!(!recorder.fractions.lock().unwrap().contains(&1.0));
    assert_eq!(tracker.phase(), PipelineState::Failed);
}

#[tokio::test]
async fn test_cancelled_before_start_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let pipeline = TranscodePipeline::new(Arc::new(FakeBackend::new(5.0)), 4);
    let (tracker, _) = recording_tracker();

    let result = pipeline.run(job(&dir, 5.0, true, None), &tracker, &cancel).await;

    assert!(matches!(result, Err(SizefitError::Cancelled)));
    assert!(dir_entries(dir.path()).is_empty());
}
