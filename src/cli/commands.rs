//! Command implementations

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app::{AppContainer, InspectInteractor, PlanPreview};
use crate::cli::args::{CompressArgs, PlanArgs, ProbeArgs};
use crate::domain::model::{CompressRequest, TrimRange};
use crate::engine::progress::{ConsoleProgressCallback, JsonProgressCallback};
use crate::engine::{CancellationToken, ProgressCallback, ProgressTracker};
use crate::utils::{format_duration, format_file_size, TimeParser};

/// Execute the compress command
pub async fn compress<C: AppContainer>(container: &C, args: CompressArgs) -> Result<()> {
    info!("Starting compress operation");
    info!("Input: {}", args.input.display());
    info!("Target: {:.2} MB", args.target_mb);

    let target_bytes = CompressRequest::megabytes_to_bytes(args.target_mb);
    let mut request = CompressRequest::new(&args.input, target_bytes);
    if let Some(trim) = parse_trim(args.start.as_deref(), args.end.as_deref())? {
        request = request.with_trim(trim);
    }
    if let Some(output) = &args.output {
        request = request.with_output(output);
    }
    if args.preserve_resolution {
        request = request.preserving_resolution();
    }

    let callback: Arc<dyn ProgressCallback> = if args.json {
        Arc::new(JsonProgressCallback)
    } else {
        Arc::new(ConsoleProgressCallback)
    };
    let progress = ProgressTracker::with_callback(callback);

    let cancel = CancellationToken::new();
    let watcher = spawn_interrupt_watcher(cancel.clone());

    let result = container
        .compressor()
        .compress(request, &progress, &cancel)
        .await;
    watcher.abort();
    let result = result.context("Compression failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        );
    } else {
        println!("Output: {}", result.output_path.display());
        println!(
            "Size: {} -> {} (ratio {:.2})",
            format_file_size(result.original_size_bytes),
            format_file_size(result.compressed_size_bytes),
            result.compression_ratio
        );
        println!(
            "Encoding: {} {} @ {} kbps{}",
            result.codec,
            result.resolution,
            result.bitrate_bps / 1000,
            result
                .frame_rate
                .map(|fps| format!(", {} fps", fps))
                .unwrap_or_default()
        );
        println!(
            "Duration: {} (took {:.1}s)",
            format_duration(result.source_duration_seconds),
            result.wall_clock_seconds
        );
    }
    Ok(())
}

/// Execute the plan command
pub async fn plan<C: AppContainer>(container: &C, args: PlanArgs) -> Result<()> {
    let trim = parse_trim(args.start.as_deref(), args.end.as_deref())?;
    let preview = container
        .compressor()
        .plan(
            &args.input,
            CompressRequest::megabytes_to_bytes(args.target_mb),
            args.preserve_resolution,
            trim,
        )
        .await
        .context("Planning failed")?;

    println!("{}", describe_plan(&preview));
    Ok(())
}

/// Execute the probe command
pub async fn probe<C: AppContainer>(container: &C, args: ProbeArgs) -> Result<()> {
    let analysis = container
        .inspect_interactor()
        .inspect(&args.input)
        .await
        .context("Failed to inspect input file")?;

    if args.json {
        println!("{}", InspectInteractor::format_as_json(&analysis)?);
    } else {
        print!("{}", InspectInteractor::format_as_text(&args.input, &analysis));
    }
    Ok(())
}

/// Build a trim from optional bounds; a missing start is 0, a missing end is
/// the end of the source
pub fn parse_trim(start: Option<&str>, end: Option<&str>) -> Result<Option<TrimRange>> {
    if start.is_none() && end.is_none() {
        return Ok(None);
    }
    let parser = TimeParser::new();
    let start = match start {
        Some(text) => parser
            .parse_time(text)
            .with_context(|| format!("Invalid start time '{}'", text))?,
        None => 0.0,
    };
    let end = match end {
        Some(text) => parser
            .parse_time(text)
            .with_context(|| format!("Invalid end time '{}'", text))?,
        None => f64::MAX,
    };
    Ok(Some(TrimRange::new(start, end)?))
}

fn describe_plan(preview: &PlanPreview) -> String {
    let analysis = &preview.analysis;
    let mut output = format!(
        "Source: {} @ {:.2} fps, {}, {} ({:.0} kbps)\n",
        analysis.display_resolution,
        analysis.frame_rate,
        format_duration(analysis.duration_seconds),
        format_file_size(analysis.file_size_bytes),
        analysis.estimated_bitrate_bps / 1000.0
    );
    if let Some(trim) = &preview.trim {
        output.push_str(&format!(
            "Trim: {} - {}\n",
            format_duration(trim.start),
            format_duration(trim.end)
        ));
    }
    match &preview.plan {
        None => output.push_str("Decision: passthrough (already within budget)"),
        Some(plan) => output.push_str(&format!(
            "Decision: transcode\n  Codec: {}\n  Resolution: {}\n  Frame rate: {} fps\n  \
             Video bitrate: {} kbps\n  Keyframe interval: {} frames\n  Audio: {}",
            plan.codec,
            plan.writer_resolution,
            plan.frame_rate,
            plan.target_bitrate_bps / 1000,
            plan.key_frame_interval_frames,
            plan.audio_bitrate_bps
                .map(|bps| format!("{} kbps", bps / 1000))
                .unwrap_or_else(|| "none".to_string())
        )),
    }
    output
}

fn spawn_interrupt_watcher(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
            Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
        }
    })
}
