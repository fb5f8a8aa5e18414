//! Capture sinks: consumers of rendered frames.
//!
//! A sink is started with the session, receives every rendered frame while
//! the session is active, and signals completion asynchronously after
//! `stop()`. Completion arrives over a [`SinkCompletion`] channel rather
//! than a callback so the coordinator can treat it as an ordinary event.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::oneshot;

use posecap_common::error::{PosecapError, PosecapResult};
use posecap_render_engine::Frame;

/// Summary delivered when a sink finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SinkReport {
    /// Frames accepted by the sink.
    pub frames_captured: u64,

    /// Frames rejected (size mismatch, encoder backpressure).
    pub frames_dropped: u64,

    /// Bytes handed to the encoder or written to disk.
    pub bytes_written: u64,

    /// Where the media ended up, if it was written to a file.
    pub output: Option<PathBuf>,
}

impl SinkReport {
    /// Drop rate as a percentage.
    pub fn drop_rate(&self) -> f64 {
        let total = self.frames_captured + self.frames_dropped;
        if total == 0 {
            return 0.0;
        }
        self.frames_dropped as f64 / total as f64 * 100.0
    }
}

/// Resolves once the sink has flushed and closed its output.
pub type SinkCompletion = oneshot::Receiver<PosecapResult<SinkReport>>;

/// A completion that is already resolved.
pub fn completed(result: PosecapResult<SinkReport>) -> SinkCompletion {
    let (tx, rx) = oneshot::channel();
    let _ = tx.send(result);
    rx
}

/// Consumer of rendered frames that produces an encoded media stream.
pub trait CaptureSink: Send {
    /// Acquire resources and begin accepting frames.
    ///
    /// Failure here is session-fatal: the session does not start.
    fn start(&mut self) -> PosecapResult<()>;

    /// Submit one rendered frame.
    fn push_frame(&mut self, frame: &Frame) -> PosecapResult<()>;

    /// Request termination. Must not block on encoder draining.
    fn stop(&mut self) -> SinkCompletion;

    /// Tear down immediately, discarding any partial output state.
    fn abort(&mut self);

    fn is_running(&self) -> bool;
}

/// Writes raw RGBA frames back to back into a single file.
///
/// Useful where no encoder is available; the output can be converted
/// later with the frame size and rate recorded alongside it.
pub struct RawFrameSink {
    path: PathBuf,
    width: u32,
    height: u32,
    writer: Option<BufWriter<File>>,
    report: SinkReport,
}

impl RawFrameSink {
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            writer: None,
            report: SinkReport::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureSink for RawFrameSink {
    fn start(&mut self) -> PosecapResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path).map_err(|e| {
            PosecapError::capture(format!("Failed to open {}: {e}", self.path.display()))
        })?;
        self.writer = Some(BufWriter::new(file));
        self.report = SinkReport {
            output: Some(self.path.clone()),
            ..SinkReport::default()
        };
        tracing::info!(path = %self.path.display(), "Raw frame sink started");
        Ok(())
    }

    fn push_frame(&mut self, frame: &Frame) -> PosecapResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(PosecapError::capture("Raw frame sink is not running"));
        };
        if (frame.width(), frame.height()) != (self.width, self.height) {
            self.report.frames_dropped += 1;
            return Err(PosecapError::capture(format!(
                "Frame is {}x{}, sink expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        writer
            .write_all(frame.as_bytes())
            .map_err(|e| PosecapError::capture(format!("Failed to write frame: {e}")))?;
        self.report.frames_captured += 1;
        self.report.bytes_written += frame.as_bytes().len() as u64;
        Ok(())
    }

    fn stop(&mut self) -> SinkCompletion {
        let Some(mut writer) = self.writer.take() else {
            return completed(Err(PosecapError::capture("Raw frame sink is not running")));
        };
        let result = writer
            .flush()
            .map(|_| self.report.clone())
            .map_err(|e| PosecapError::capture(format!("Failed to flush frames: {e}")));
        completed(result)
    }

    fn abort(&mut self) {
        self.writer = None;
    }

    fn is_running(&self) -> bool {
        self.writer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posecap_render_engine::Rgba;

    #[test]
    fn raw_sink_writes_frames_and_reports() {
        let dir = std::env::temp_dir().join("posecap_test_raw_sink");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("frames.rgba");

        let mut sink = RawFrameSink::new(&path, 2, 2);
        sink.start().unwrap();
        sink.push_frame(&Frame::filled(2, 2, Rgba::WHITE)).unwrap();
        assert!(sink.push_frame(&Frame::filled(3, 3, Rgba::WHITE)).is_err());

        let report = sink.stop().try_recv().unwrap().unwrap();
        assert_eq!(report.frames_captured, 1);
        assert_eq!(report.frames_dropped, 1);
        assert_eq!(report.bytes_written, 16);
        assert!((report.drop_rate() - 50.0).abs() < 1e-9);
        assert_eq!(std::fs::read(&path).unwrap().len(), 16);
        assert!(!sink.is_running());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn stop_without_start_reports_failure() {
        let mut sink = RawFrameSink::new(std::env::temp_dir().join("unused.rgba"), 1, 1);
        assert!(sink.stop().try_recv().unwrap().is_err());
    }
}
