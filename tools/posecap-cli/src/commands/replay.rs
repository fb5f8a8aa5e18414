//! Replay a pose log as one capture session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use posecap_capture_engine::pipeline::GstCaptureSink;
use posecap_capture_engine::{
    spawn_coordinator, CaptureContext, CaptureSink, ExportOutcome, FileExportSink, MediaStatus,
    RawFrameSink, StopOutcome,
};
use posecap_common::clock::{ManualTime, MonotonicTime, TimeSource};
use posecap_common::config::AppConfig;
use posecap_common::error::PosecapError;
use posecap_pose_model::parse_pose_log;

use crate::SinkKind;

/// Command-line overrides for a replay.
pub struct ReplayOptions {
    pub output: Option<PathBuf>,
    pub threshold: Option<f64>,
    pub sink: SinkKind,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub realtime: bool,
    pub json: bool,
}

#[derive(Debug, Default, Serialize)]
struct ReplaySummary {
    frames: usize,
    rows_recorded: usize,
    poses_skipped: usize,
    poses_rejected: usize,
    outcome: Option<ExportOutcome>,
}

pub async fn run(
    mut config: AppConfig,
    poses: PathBuf,
    options: ReplayOptions,
) -> anyhow::Result<()> {
    if let Some(output) = options.output {
        config.output_dir = output;
    }
    if let Some(threshold) = options.threshold {
        config.capture.score_threshold = threshold;
    }
    if let Some(width) = options.width {
        config.capture.width = width;
    }
    if let Some(height) = options.height {
        config.capture.height = height;
    }

    if !poses.exists() {
        return Err(PosecapError::FileNotFound { path: poses }.into());
    }
    let content = std::fs::read_to_string(&poses)
        .with_context(|| format!("Failed to read pose log {}", poses.display()))?;
    let frames = parse_pose_log(&content)?;
    if frames.is_empty() {
        anyhow::bail!("Pose log {} contains no frames", poses.display());
    }

    std::fs::create_dir_all(&config.output_dir)?;
    let capture = build_sink(&config, options.sink);
    let exporter = Box::new(FileExportSink::new(&config.output_dir));

    // Replayed frames carry their own timestamps unless pacing in real time.
    let time = ManualTime::new();
    let source: Arc<dyn TimeSource> = if options.realtime {
        Arc::new(MonotonicTime::new())
    } else {
        Arc::new(time.clone())
    };
    let context = CaptureContext::from_config(&config, source, capture, exporter)?;
    let flush_delay = Duration::from_millis(config.capture.export_flush_delay_ms);
    let (handle, task) = spawn_coordinator(context, flush_delay);
    let mut outcomes = handle.subscribe();

    if !options.json {
        println!("Replaying {} frames from {}", frames.len(), poses.display());
        println!("  Output: {}", config.output_dir.display());
        println!("  Threshold: {}", config.capture.score_threshold);
        println!(
            "  Surface: {}x{} @ {}fps",
            config.capture.width, config.capture.height, config.capture.fps
        );
        println!();
    }

    let frame_ms = 1000.0 / config.capture.fps.max(1) as f64;
    let timestamps = frame_times(frames.iter().map(|f| f.t_ms), frame_ms);

    let first_ms = timestamps[0];
    time.set_ms(first_ms);
    handle.start().await?;
    let started = tokio::time::Instant::now();

    let mut summary = ReplaySummary {
        frames: frames.len(),
        ..ReplaySummary::default()
    };
    for (frame, t_ms) in frames.into_iter().zip(timestamps) {
        if options.realtime {
            let deadline = started
                .checked_add(pacing_offset(t_ms, first_ms)?)
                .with_context(|| format!("Frame timestamp {t_ms} ms is out of range"))?;
            tokio::time::sleep_until(deadline).await;
        } else {
            time.set_ms(t_ms);
        }
        let report = handle.process_frame(None, frame.poses).await?;
        summary.rows_recorded += report.rows_recorded;
        summary.poses_skipped += report.poses_skipped;
        summary.poses_rejected += report.poses_rejected;
    }

    summary.outcome = match handle.stop().await? {
        StopOutcome::Finalizing { .. } => Some(
            outcomes
                .recv()
                .await
                .context("Coordinator exited before the export completed")?,
        ),
        StopOutcome::Ignored(state) => {
            tracing::warn!(%state, "Session was not active at end of replay");
            None
        }
    };
    handle.shutdown().await?;
    task.await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if let Some(ExportOutcome::Failed { message, .. }) = summary.outcome {
        anyhow::bail!("Keypoint export failed: {message}");
    }
    Ok(())
}

fn build_sink(config: &AppConfig, kind: SinkKind) -> Box<dyn CaptureSink> {
    let capture = &config.capture;
    match kind {
        SinkKind::Gst => Box::new(GstCaptureSink::new(
            config.output_dir.join(&capture.video_file_name),
            capture.width,
            capture.height,
            capture.fps,
        )),
        SinkKind::Raw => Box::new(RawFrameSink::new(
            raw_path(&config.output_dir, &capture.video_file_name),
            capture.width,
            capture.height,
        )),
    }
}

fn raw_path(dir: &Path, video_file_name: &str) -> PathBuf {
    dir.join(Path::new(video_file_name).with_extension("rgba"))
}

/// Resolve a timestamp for every frame.
///
/// Frames without `t_ms` are placed one frame interval after their
/// predecessor; timestamps never move backwards.
fn frame_times(t_ms: impl Iterator<Item = Option<f64>>, frame_ms: f64) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::new();
    for t in t_ms {
        let next = match (t, out.last()) {
            (Some(t), Some(&prev)) if t < prev => {
                tracing::warn!(t_ms = t, prev_ms = prev, "Frame timestamp went backwards; clamping");
                prev
            }
            (Some(t), _) if t.is_finite() => t,
            (_, Some(&prev)) => prev + frame_ms,
            (_, None) => 0.0,
        };
        out.push(next);
    }
    out
}

/// Delay of a frame from the first one when pacing in real time.
fn pacing_offset(t_ms: f64, first_ms: f64) -> anyhow::Result<Duration> {
    let secs = (t_ms - first_ms).max(0.0) / 1000.0;
    Duration::try_from_secs_f64(secs)
        .with_context(|| format!("Frame timestamp {t_ms} ms is out of range"))
}

fn print_summary(summary: &ReplaySummary) {
    println!("Frames replayed: {}", summary.frames);
    println!("  Rows recorded: {}", summary.rows_recorded);
    if summary.poses_skipped > 0 {
        println!("  Poses without keypoints: {}", summary.poses_skipped);
    }
    if summary.poses_rejected > 0 {
        println!("  Poses rejected: {}", summary.poses_rejected);
    }
    println!();

    let Some(outcome) = &summary.outcome else {
        println!("[WARN] Session did not finalize; nothing was written");
        return;
    };
    match outcome.media() {
        MediaStatus::Completed(report) => {
            println!("[OK] Video: {} frames captured", report.frames_captured)
        }
        MediaStatus::Failed(err) => println!("[FAIL] Video: {err}"),
    }
    match outcome {
        ExportOutcome::Exported { path, rows, .. } => {
            println!("[OK] Keypoints: {rows} rows -> {}", path.display())
        }
        ExportOutcome::NothingToExport { .. } => {
            println!("[WARN] Keypoints: no keypoints data to export")
        }
        ExportOutcome::Failed { message, .. } => println!("[FAIL] Keypoints: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_timestamps_advance_one_frame() {
        let times = frame_times([None, Some(100.0), None, None].into_iter(), 25.0);
        assert_eq!(times, vec![0.0, 100.0, 125.0, 150.0]);
    }

    #[test]
    fn backwards_timestamps_are_clamped() {
        let times = frame_times([Some(50.0), Some(40.0), Some(60.0)].into_iter(), 10.0);
        assert_eq!(times, vec![50.0, 50.0, 60.0]);
    }

    #[test]
    fn pacing_offset_rejects_unrepresentable_timestamps() {
        assert_eq!(pacing_offset(1500.0, 500.0).unwrap(), Duration::from_secs(1));
        assert_eq!(pacing_offset(100.0, 500.0).unwrap(), Duration::ZERO);
        assert!(pacing_offset(1e300, 0.0).is_err());
    }

    #[test]
    fn raw_sink_path_replaces_extension() {
        let path = raw_path(Path::new("/tmp/out"), "recording.webm");
        assert_eq!(path, PathBuf::from("/tmp/out/recording.rgba"));
    }
}
