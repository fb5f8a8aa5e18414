//! GStreamer-backed capture sink.
//!
//! Rendered frames are pushed into an `appsrc` and encoded to VP9/WebM:
//!
//! ```text
//! appsrc (RGBA) ! videoconvert ! vp9enc ! webmmux ! filesink
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use gst::prelude::*;
use gstreamer as gst;
use tokio::sync::oneshot;

use posecap_common::error::{PosecapError, PosecapResult};
use posecap_render_engine::Frame;

use crate::sink::{completed, CaptureSink, SinkCompletion, SinkReport};

/// Elements the encoding pipeline needs.
pub const REQUIRED_ELEMENTS: [&str; 5] =
    ["appsrc", "videoconvert", "vp9enc", "webmmux", "filesink"];

const EOS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Encodes rendered frames into a WebM file.
pub struct GstCaptureSink {
    name: String,
    output_path: PathBuf,
    width: u32,
    height: u32,
    fps: u32,
    pipeline: Option<gst::Pipeline>,
    appsrc: Option<gst::Element>,
    report: SinkReport,
}

impl GstCaptureSink {
    pub fn new(output_path: impl Into<PathBuf>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            name: "overlay".to_string(),
            output_path: output_path.into(),
            width,
            height,
            fps: fps.max(1),
            pipeline: None,
            appsrc: None,
            report: SinkReport::default(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn frame_duration_ns(&self) -> u64 {
        1_000_000_000 / self.fps as u64
    }
}

/// Build the gst-launch description for the encoder pipeline.
pub fn launch_description(output_path: &Path, width: u32, height: u32, fps: u32) -> String {
    let path = escape_path(output_path);
    // `deadline=1` selects realtime encoding; keyframe every 2 seconds keeps
    // the file seekable.
    let keyint = fps.saturating_mul(2).max(2);
    format!(
        "appsrc name=src is-live=true format=time \
         caps=\"video/x-raw,format=RGBA,width={width},height={height},framerate={fps}/1\" \
         ! queue max-size-buffers=8 ! videoconvert ! vp9enc deadline=1 keyframe-max-dist={keyint} \
         ! webmmux ! filesink location=\"{path}\""
    )
}

impl CaptureSink for GstCaptureSink {
    fn start(&mut self) -> PosecapResult<()> {
        if self.pipeline.is_some() {
            return Err(PosecapError::capture("Capture pipeline already running"));
        }
        init_gstreamer()?;
        if let Some(parent) = self.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let launch = launch_description(&self.output_path, self.width, self.height, self.fps);
        let element = gst::parse::launch(&launch)
            .map_err(|e| PosecapError::capture(format!("Failed to build pipeline: {e}")))?;
        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| PosecapError::capture("Launch string did not produce a pipeline"))?;
        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| PosecapError::capture("Pipeline has no appsrc named 'src'"))?;

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            PosecapError::capture(format!("Failed to start {} pipeline: {e:?}", self.name))
        })?;

        tracing::info!(
            pipeline = %self.name,
            path = %self.output_path.display(),
            width = self.width,
            height = self.height,
            fps = self.fps,
            "Capture pipeline started"
        );
        self.report = SinkReport {
            output: Some(self.output_path.clone()),
            ..SinkReport::default()
        };
        self.pipeline = Some(pipeline);
        self.appsrc = Some(appsrc);
        Ok(())
    }

    fn push_frame(&mut self, frame: &Frame) -> PosecapResult<()> {
        let Some(appsrc) = self.appsrc.as_ref() else {
            return Err(PosecapError::capture("Capture pipeline is not running"));
        };
        if (frame.width(), frame.height()) != (self.width, self.height) {
            self.report.frames_dropped += 1;
            return Err(PosecapError::capture(format!(
                "Frame is {}x{}, pipeline expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let frame_ns = self.frame_duration_ns();
        let bytes = frame.as_bytes().to_vec();
        let len = bytes.len() as u64;
        let mut buffer = gst::Buffer::from_mut_slice(bytes);
        if let Some(buf) = buffer.get_mut() {
            buf.set_pts(gst::ClockTime::from_nseconds(
                self.report.frames_captured * frame_ns,
            ));
            buf.set_duration(gst::ClockTime::from_nseconds(frame_ns));
        }
        let flow = appsrc
            .emit_by_name_with_values("push-buffer", &[buffer.to_value()])
            .and_then(|v| v.get::<gst::FlowReturn>().ok());
        record_push(&mut self.report, flow, len)
    }

    fn stop(&mut self) -> SinkCompletion {
        let appsrc = self.appsrc.take();
        let Some(pipeline) = self.pipeline.take() else {
            return completed(Err(PosecapError::capture(
                "Capture pipeline is not running",
            )));
        };

        // End-of-stream lets the encoder and muxer flush and finalize the
        // file; the drain happens off the caller's thread.
        if let Some(appsrc) = appsrc {
            appsrc.emit_by_name_with_values("end-of-stream", &[]);
        }

        let (tx, rx) = oneshot::channel();
        let name = self.name.clone();
        let report = self.report.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("{name}-drain"))
            .spawn(move || {
                let result = drain_and_close(&name, &pipeline).map(|_| report);
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            return completed(Err(PosecapError::capture(format!(
                "Failed to spawn pipeline drain thread: {e}"
            ))));
        }
        rx
    }

    fn abort(&mut self) {
        self.appsrc = None;
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                tracing::warn!(pipeline = %self.name, error = ?e, "Failed to abort pipeline");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }
}

impl Drop for GstCaptureSink {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Wait for EOS (or an error) on the bus, then shut the pipeline down.
fn drain_and_close(name: &str, pipeline: &gst::Pipeline) -> PosecapResult<()> {
    let mut failure = None;

    if let Some(bus) = pipeline.bus() {
        let start = std::time::Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= EOS_DRAIN_TIMEOUT {
                tracing::warn!(pipeline = %name, "EOS drain timed out; output may be truncated");
                break;
            }
            let remaining = EOS_DRAIN_TIMEOUT - elapsed;
            match bus.timed_pop(gst::ClockTime::from_nseconds(remaining.as_nanos() as u64)) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Eos(_) => {
                        tracing::debug!(pipeline = %name, "EOS received; pipeline drained");
                        break;
                    }
                    gst::MessageView::Error(e) => {
                        failure = Some(PosecapError::capture(format!(
                            "{name} pipeline error: {}",
                            e.error()
                        )));
                        break;
                    }
                    _ => {}
                },
                None => {
                    tracing::warn!(pipeline = %name, "EOS drain timed out; output may be truncated");
                    break;
                }
            }
        }
    }

    pipeline.set_state(gst::State::Null).map_err(|e| {
        PosecapError::capture(format!("Failed to stop {name} pipeline: {e:?}"))
    })?;

    match failure {
        Some(err) => Err(err),
        None => {
            tracing::info!(pipeline = %name, "Capture pipeline finalized");
            Ok(())
        }
    }
}

pub fn init_gstreamer() -> PosecapResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(PosecapError::capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Names of required elements that are not installed.
pub fn missing_elements() -> PosecapResult<Vec<&'static str>> {
    init_gstreamer()?;
    Ok(REQUIRED_ELEMENTS
        .iter()
        .copied()
        .filter(|name| gst::ElementFactory::find(name).is_none())
        .collect())
}

/// Count a pushed buffer as captured only when `appsrc` accepted it.
fn record_push(
    report: &mut SinkReport,
    flow: Option<gst::FlowReturn>,
    len: u64,
) -> PosecapResult<()> {
    match flow {
        Some(gst::FlowReturn::Ok) => {
            report.frames_captured += 1;
            report.bytes_written += len;
            Ok(())
        }
        other => {
            report.frames_dropped += 1;
            Err(PosecapError::capture(format!(
                "appsrc refused buffer: {other:?}"
            )))
        }
    }
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_description_carries_caps_and_location() {
        let launch = launch_description(Path::new("/tmp/out \"a\".webm"), 640, 480, 30);
        assert!(launch.contains("width=640,height=480,framerate=30/1"));
        assert!(launch.contains("keyframe-max-dist=60"));
        assert!(launch.contains("location=\"/tmp/out \\\"a\\\".webm\""));
        assert!(launch.starts_with("appsrc name=src"));
    }

    #[test]
    fn refused_buffer_counts_as_dropped() {
        let mut report = SinkReport::default();
        record_push(&mut report, Some(gst::FlowReturn::Ok), 16).unwrap();
        assert!(record_push(&mut report, Some(gst::FlowReturn::Flushing), 16).is_err());
        assert!(record_push(&mut report, None, 16).is_err());
        assert_eq!(report.frames_captured, 1);
        assert_eq!(report.frames_dropped, 2);
        assert_eq!(report.bytes_written, 16);
    }

    #[test]
    fn push_before_start_is_rejected() {
        let mut sink = GstCaptureSink::new("/tmp/unused.webm", 2, 2, 30);
        let err = sink.push_frame(&Frame::filled(2, 2, posecap_render_engine::Rgba::BLACK));
        assert!(err.is_err());
        assert!(!sink.is_running());
        assert!(sink.stop().try_recv().unwrap().is_err());
    }
}
