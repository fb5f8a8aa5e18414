//! Session coordination.
//!
//! [`CaptureContext`] ties together the renderer, drawing surface,
//! recording session, capture sink, and export sink, and owns the one
//! score threshold they share. [`spawn_coordinator`] runs a context on a
//! tokio task that processes control commands, frames, and capture-sink
//! completions strictly one at a time:
//!
//! ```text
//! SessionHandle ──commands──┐
//!                           ├──► coordinator task ──► CaptureContext
//! sink completion ──events──┘          │
//!   (after flush delay)                └──► ExportOutcome (broadcast)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use posecap_common::clock::TimeSource;
use posecap_common::config::AppConfig;
use posecap_common::error::{PosecapError, PosecapResult};
use posecap_pose_model::{
    CocoTopology, KeypointSchema, Pose, PoseModel, ScoreThreshold, TopologyProvider,
};
use posecap_render_engine::{
    DrawStats, DrawingSurface, Frame, FrameRenderer, RasterSurface, RenderStyle,
};

use crate::export::ExportSink;
use crate::session::{
    RecordOutcome, RecordingSession, SessionState, StartOutcome, StopOutcome,
};
use crate::sink::{CaptureSink, SinkCompletion, SinkReport};

const COMMAND_QUEUE_DEPTH: usize = 64;
const OUTCOME_QUEUE_DEPTH: usize = 16;

/// How the media side of a session ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum MediaStatus {
    Completed(SinkReport),
    Failed(String),
}

/// Result of finalizing one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExportOutcome {
    /// The keypoint export was delivered.
    Exported {
        path: PathBuf,
        rows: usize,
        media: MediaStatus,
    },
    /// The session recorded no rows, so no export was produced.
    NothingToExport { media: MediaStatus },
    /// Rows existed but could not be delivered.
    Failed { message: String, media: MediaStatus },
}

impl ExportOutcome {
    pub fn media(&self) -> &MediaStatus {
        match self {
            Self::Exported { media, .. }
            | Self::NothingToExport { media }
            | Self::Failed { media, .. } => media,
        }
    }
}

/// What happened to one rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub drawn: DrawStats,
    /// Rows appended to the session buffer.
    pub rows_recorded: usize,
    /// Poses without keypoints.
    pub poses_skipped: usize,
    /// Poses rejected as malformed.
    pub poses_rejected: usize,
    /// Whether the rendered frame reached the capture sink.
    pub pushed: bool,
}

/// The explicit pipeline context: one per application instance.
pub struct CaptureContext {
    session: RecordingSession,
    renderer: FrameRenderer,
    surface: Box<dyn DrawingSurface>,
    capture: Box<dyn CaptureSink>,
    exporter: Box<dyn ExportSink>,
    threshold: ScoreThreshold,
}

impl CaptureContext {
    pub fn new(
        session: RecordingSession,
        renderer: FrameRenderer,
        surface: Box<dyn DrawingSurface>,
        capture: Box<dyn CaptureSink>,
        exporter: Box<dyn ExportSink>,
        threshold: ScoreThreshold,
    ) -> Self {
        Self {
            session,
            renderer,
            surface,
            capture,
            exporter,
            threshold,
        }
    }

    /// Assemble a context from configuration with the canonical schema,
    /// COCO topology, and an in-memory raster surface.
    pub fn from_config(
        config: &AppConfig,
        time: Arc<dyn TimeSource>,
        capture: Box<dyn CaptureSink>,
        exporter: Box<dyn ExportSink>,
    ) -> PosecapResult<Self> {
        config.validate()?;
        let model: PoseModel = config.capture.model.parse()?;
        let threshold = ScoreThreshold::new(config.capture.score_threshold)?;
        let topology: &dyn TopologyProvider = &CocoTopology;
        let renderer =
            FrameRenderer::new(topology, model, RenderStyle::from_config(&config.style)?)?;
        let session = RecordingSession::new(KeypointSchema::coco17(), time)
            .with_export_file_name(config.capture.export_file_name.clone());
        let surface = Box::new(RasterSurface::new(
            config.capture.width,
            config.capture.height,
        ));

        tracing::debug!(%model, %threshold, "Capture context assembled");
        Ok(Self::new(
            session, renderer, surface, capture, exporter, threshold,
        ))
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    pub fn threshold(&self) -> ScoreThreshold {
        self.threshold
    }

    /// Change the threshold for both drawing and recording.
    pub fn set_score_threshold(&mut self, threshold: ScoreThreshold) {
        tracing::info!(%threshold, "Score threshold updated");
        self.threshold = threshold;
    }

    /// Current contents of the drawing surface.
    pub fn snapshot(&self) -> Frame {
        self.surface.snapshot()
    }

    /// Start (or restart) capture.
    ///
    /// Rejected while finalizing. If the capture sink cannot start, the
    /// session stays idle and the error is returned.
    pub fn start(&mut self) -> PosecapResult<StartOutcome> {
        if self.session.state() == SessionState::Finalizing {
            return Err(PosecapError::session_busy(
                "Previous session is still finalizing its export",
            ));
        }
        if self.capture.is_running() {
            self.capture.abort();
        }
        if let Err(e) = self.capture.start() {
            let discarded = self.session.abandon();
            tracing::error!(error = %e, discarded, "Capture sink failed to start");
            return Err(e);
        }
        self.session.start()
    }

    /// Stop capture. Returns the sink's completion when finalization began.
    pub fn stop(&mut self) -> (StopOutcome, Option<SinkCompletion>) {
        match self.session.stop() {
            outcome @ StopOutcome::Finalizing { .. } => (outcome, Some(self.capture.stop())),
            outcome @ StopOutcome::Ignored(_) => (outcome, None),
        }
    }

    /// Draw a frame with its poses, record rows, and feed the capture sink.
    ///
    /// A pose that does not fit the keypoint schema is neither drawn nor
    /// recorded. Per-pose and per-frame failures are logged and never end
    /// the session.
    pub fn process_frame(&mut self, video: Option<&Frame>, poses: &[Pose]) -> FrameReport {
        let mut report = FrameReport::default();

        self.renderer.draw_video_frame(self.surface.as_mut(), video);

        for pose in poses {
            if pose.detected_keypoints().is_some() {
                if let Err(e) = self.session.schema().validate(pose) {
                    tracing::warn!(error = %e, "Pose rejected; continuing");
                    report.poses_rejected += 1;
                    continue;
                }
            }
            report.drawn += self
                .renderer
                .draw_pose(self.surface.as_mut(), pose, self.threshold);

            match self.session.record_frame(pose, self.threshold) {
                Ok(RecordOutcome::Recorded) => report.rows_recorded += 1,
                Ok(RecordOutcome::NoKeypoints) => report.poses_skipped += 1,
                Ok(RecordOutcome::NotActive) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Pose rejected; continuing");
                    report.poses_rejected += 1;
                }
            }
        }

        if self.session.state() == SessionState::Active && self.capture.is_running() {
            match self.capture.push_frame(&self.surface.snapshot()) {
                Ok(()) => report.pushed = true,
                Err(e) => tracing::warn!(error = %e, "Frame not captured; continuing"),
            }
        }
        report
    }

    /// Complete finalization after the capture sink has finished.
    ///
    /// Rows are exported even when the media side failed.
    pub fn finish(&mut self, sink_result: PosecapResult<SinkReport>) -> ExportOutcome {
        let media = match sink_result {
            Ok(report) => {
                tracing::info!(
                    frames = report.frames_captured,
                    drop_rate = report.drop_rate(),
                    "Capture sink completed"
                );
                MediaStatus::Completed(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Capture sink failed; exporting keypoints anyway");
                MediaStatus::Failed(e.to_string())
            }
        };

        match self.session.finish() {
            Ok(Some(document)) => match self.exporter.deliver(&document) {
                Ok(path) => ExportOutcome::Exported {
                    path,
                    rows: document.row_count,
                    media,
                },
                Err(e) => {
                    tracing::error!(error = %e, "Failed to deliver keypoint export");
                    ExportOutcome::Failed {
                        message: e.to_string(),
                        media,
                    }
                }
            },
            Ok(None) => ExportOutcome::NothingToExport { media },
            Err(e) => ExportOutcome::Failed {
                message: e.to_string(),
                media,
            },
        }
    }

    /// Release the capture sink and drop any unexported rows.
    pub fn shutdown(&mut self) {
        if self.capture.is_running() {
            self.capture.abort();
        }
        let discarded = self.session.abandon();
        if discarded > 0 {
            tracing::warn!(discarded, "Shutting down with unexported rows");
        }
    }
}

enum SessionCommand {
    Start(oneshot::Sender<PosecapResult<StartOutcome>>),
    Stop(oneshot::Sender<StopOutcome>),
    Frame {
        video: Option<Frame>,
        poses: Vec<Pose>,
        reply: Option<oneshot::Sender<FrameReport>>,
    },
    SetThreshold(ScoreThreshold),
    State(oneshot::Sender<SessionState>),
    Shutdown,
}

/// Cloneable control surface for a running coordinator.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    outcomes: broadcast::Sender<ExportOutcome>,
}

impl SessionHandle {
    pub async fn start(&self) -> PosecapResult<StartOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Start(tx)).await?;
        rx.await.map_err(|_| coordinator_gone())?
    }

    pub async fn stop(&self) -> PosecapResult<StopOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Stop(tx)).await?;
        rx.await.map_err(|_| coordinator_gone())
    }

    /// Queue a frame without waiting for it to be processed.
    pub async fn submit_frame(&self, video: Option<Frame>, poses: Vec<Pose>) -> PosecapResult<()> {
        self.send(SessionCommand::Frame {
            video,
            poses,
            reply: None,
        })
        .await
    }

    /// Queue a frame and wait until it has been drawn and recorded.
    pub async fn process_frame(
        &self,
        video: Option<Frame>,
        poses: Vec<Pose>,
    ) -> PosecapResult<FrameReport> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Frame {
            video,
            poses,
            reply: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| coordinator_gone())
    }

    pub async fn set_score_threshold(&self, threshold: ScoreThreshold) -> PosecapResult<()> {
        self.send(SessionCommand::SetThreshold(threshold)).await
    }

    pub async fn state(&self) -> PosecapResult<SessionState> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::State(tx)).await?;
        rx.await.map_err(|_| coordinator_gone())
    }

    /// Receive an [`ExportOutcome`] for every finalized session from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ExportOutcome> {
        self.outcomes.subscribe()
    }

    /// Ask the coordinator to exit. A pending finalization completes first.
    pub async fn shutdown(&self) -> PosecapResult<()> {
        self.send(SessionCommand::Shutdown).await
    }

    async fn send(&self, command: SessionCommand) -> PosecapResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| coordinator_gone())
    }
}

fn coordinator_gone() -> PosecapError {
    PosecapError::capture("Session coordinator has shut down")
}

/// Run `context` on a new tokio task.
///
/// `flush_delay` is waited between the capture sink's completion and
/// serialization. The task exits on `shutdown()` or once every handle is
/// dropped, in both cases after any pending finalization.
pub fn spawn_coordinator(
    context: CaptureContext,
    flush_delay: Duration,
) -> (SessionHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (outcomes_tx, _) = broadcast::channel(OUTCOME_QUEUE_DEPTH);
    let (completions_tx, completions_rx) = mpsc::unbounded_channel();

    let coordinator = Coordinator {
        context,
        flush_delay,
        commands: commands_rx,
        completions_tx,
        completions: completions_rx,
        outcomes: outcomes_tx.clone(),
    };
    let task = tokio::spawn(coordinator.run());

    let handle = SessionHandle {
        commands: commands_tx,
        outcomes: outcomes_tx,
    };
    (handle, task)
}

struct Coordinator {
    context: CaptureContext,
    flush_delay: Duration,
    commands: mpsc::Receiver<SessionCommand>,
    completions_tx: mpsc::UnboundedSender<PosecapResult<SinkReport>>,
    completions: mpsc::UnboundedReceiver<PosecapResult<SinkReport>>,
    outcomes: broadcast::Sender<ExportOutcome>,
}

impl Coordinator {
    async fn run(mut self) {
        let mut exiting = false;

        loop {
            let finalizing = self.context.state() == SessionState::Finalizing;
            if exiting && !finalizing {
                break;
            }

            tokio::select! {
                Some(result) = self.completions.recv() => {
                    let outcome = self.context.finish(result);
                    // No subscribers is fine.
                    let _ = self.outcomes.send(outcome);
                }
                command = self.commands.recv(), if !exiting => match command {
                    Some(SessionCommand::Shutdown) | None => exiting = true,
                    Some(command) => self.handle(command),
                },
            }
        }

        self.context.shutdown();
        tracing::debug!("Session coordinator stopped");
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start(reply) => {
                let _ = reply.send(self.context.start());
            }
            SessionCommand::Stop(reply) => {
                let (outcome, completion) = self.context.stop();
                if let Some(completion) = completion {
                    self.await_completion(completion);
                }
                let _ = reply.send(outcome);
            }
            SessionCommand::Frame {
                video,
                poses,
                reply,
            } => {
                let report = self.context.process_frame(video.as_ref(), &poses);
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
            SessionCommand::SetThreshold(threshold) => {
                self.context.set_score_threshold(threshold);
            }
            SessionCommand::State(reply) => {
                let _ = reply.send(self.context.state());
            }
            SessionCommand::Shutdown => {}
        }
    }

    /// Forward the sink's completion into the event queue after the flush delay.
    fn await_completion(&self, completion: SinkCompletion) {
        let tx = self.completions_tx.clone();
        let delay = self.flush_delay;
        tokio::spawn(async move {
            let result = completion.await.unwrap_or_else(|_| {
                Err(PosecapError::capture(
                    "Capture sink dropped without signalling completion",
                ))
            });
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = tx.send(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::MemoryExportSink;
    use crate::sink::completed;
    use posecap_common::clock::ManualTime;
    use posecap_pose_model::Keypoint;
    use posecap_render_engine::Rgba;

    /// Sink that records pushes; completion is resolved immediately.
    #[derive(Default)]
    struct CountingSink {
        running: bool,
        pushed: u64,
        fail_start: bool,
    }

    impl CaptureSink for CountingSink {
        fn start(&mut self) -> PosecapResult<()> {
            if self.fail_start {
                return Err(PosecapError::capture("no encoder"));
            }
            self.running = true;
            self.pushed = 0;
            Ok(())
        }

        fn push_frame(&mut self, _frame: &Frame) -> PosecapResult<()> {
            self.pushed += 1;
            Ok(())
        }

        fn stop(&mut self) -> SinkCompletion {
            self.running = false;
            completed(Ok(SinkReport {
                frames_captured: self.pushed,
                ..SinkReport::default()
            }))
        }

        fn abort(&mut self) {
            self.running = false;
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    fn context(sink: CountingSink) -> (CaptureContext, MemoryExportSink) {
        let exports = MemoryExportSink::new();
        let mut config = AppConfig::default();
        config.capture.width = 64;
        config.capture.height = 64;
        config.capture.score_threshold = 0.5;
        let context = CaptureContext::from_config(
            &config,
            Arc::new(ManualTime::new()),
            Box::new(sink),
            Box::new(exports.clone()),
        )
        .unwrap();
        (context, exports)
    }

    fn pose() -> Pose {
        Pose::new(vec![Keypoint::new(10.0, 10.0, Some(0.9)); 17])
    }

    #[test]
    fn frames_are_drawn_but_not_recorded_while_idle() {
        let (mut ctx, _) = context(CountingSink::default());
        let report = ctx.process_frame(None, &[pose()]);
        assert_eq!(report.rows_recorded, 0);
        assert!(!report.pushed);
        assert_eq!(report.drawn.keypoints, 17);
    }

    #[test]
    fn sink_start_failure_keeps_session_idle() {
        let (mut ctx, _) = context(CountingSink {
            fail_start: true,
            ..CountingSink::default()
        });
        assert!(ctx.start().is_err());
        assert_eq!(ctx.state(), SessionState::Idle);
    }

    #[test]
    fn malformed_pose_does_not_abort_frame() {
        let (mut ctx, _) = context(CountingSink::default());
        ctx.start().unwrap();
        let short = Pose::new(vec![Keypoint::new(1.0, 1.0, None); 4]);
        let report = ctx.process_frame(None, &[short, pose(), Pose::default()]);
        assert_eq!(report.poses_rejected, 1);
        assert_eq!(report.rows_recorded, 1);
        assert_eq!(report.poses_skipped, 1);
        assert!(report.pushed);
        assert_eq!(ctx.state(), SessionState::Active);
    }

    #[test]
    fn malformed_pose_is_not_drawn() {
        let (mut ctx, _) = context(CountingSink::default());
        let short = Pose::new(vec![Keypoint::new(10.0, 10.0, Some(0.9)); 4]);
        let report = ctx.process_frame(None, &[short]);
        assert_eq!(report.drawn, DrawStats::default());
        assert_eq!(report.poses_rejected, 1);
        assert_eq!(ctx.surface.snapshot().pixel(10, 10), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn non_finite_keypoint_is_neither_drawn_nor_exported() {
        let (mut ctx, exports) = context(CountingSink::default());
        ctx.start().unwrap();
        let mut kps = vec![Keypoint::new(0.0, 0.0, Some(0.0)); 17];
        kps[0] = Keypoint::new(30.0, 30.0, Some(f64::INFINITY));
        let report = ctx.process_frame(None, &[Pose::new(kps)]);
        assert_eq!(report.drawn.keypoints, 0);
        assert_eq!(report.rows_recorded, 1);

        ctx.stop();
        ctx.finish(Ok(SinkReport::default()));
        let documents = exports.documents();
        let row = documents[0].contents.lines().nth(1).unwrap();
        assert!(row.split(',').skip(1).all(str::is_empty), "{row}");
    }

    #[test]
    fn sink_failure_still_exports_rows() {
        let (mut ctx, exports) = context(CountingSink::default());
        ctx.start().unwrap();
        ctx.process_frame(None, &[pose()]);
        let (outcome, _) = ctx.stop();
        assert_eq!(outcome, StopOutcome::Finalizing { rows: 1 });

        let outcome = ctx.finish(Err(PosecapError::capture("encoder crashed")));
        assert!(matches!(outcome, ExportOutcome::Exported { rows: 1, .. }));
        assert!(matches!(outcome.media(), MediaStatus::Failed(msg) if msg.contains("encoder crashed")));
        assert_eq!(exports.documents().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn coordinator_exports_after_flush_delay() {
        let (ctx, exports) = context(CountingSink::default());
        let (handle, task) = spawn_coordinator(ctx, Duration::from_millis(1000));
        let mut outcomes = handle.subscribe();

        handle.start().await.unwrap();
        let report = handle.process_frame(None, vec![pose()]).await.unwrap();
        assert!(report.pushed);
        handle.stop().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), SessionState::Finalizing);

        let outcome = outcomes.recv().await.unwrap();
        match outcome {
            ExportOutcome::Exported { rows, media, .. } => {
                assert_eq!(rows, 1);
                assert!(matches!(media, MediaStatus::Completed(r) if r.frames_captured == 1));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(handle.state().await.unwrap(), SessionState::Idle);
        assert_eq!(exports.documents().len(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn submitted_frames_are_processed_in_order() {
        let (ctx, exports) = context(CountingSink::default());
        let (handle, task) = spawn_coordinator(ctx, Duration::ZERO);
        let mut outcomes = handle.subscribe();

        handle.start().await.unwrap();
        for _ in 0..3 {
            handle.submit_frame(None, vec![pose()]).await.unwrap();
        }
        assert_eq!(
            handle.stop().await.unwrap(),
            StopOutcome::Finalizing { rows: 3 }
        );
        outcomes.recv().await.unwrap();
        assert_eq!(exports.documents()[0].row_count, 3);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[test]
    fn outcome_serializes_with_media_status() {
        let outcome = ExportOutcome::Exported {
            path: PathBuf::from("out/keypoints_with_scores.csv"),
            rows: 2,
            media: MediaStatus::Failed("no encoder".into()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "exported");
        assert_eq!(json["rows"], 2);
        assert_eq!(json["media"]["status"], "failed");
        assert_eq!(json["media"]["detail"], "no encoder");
    }

    #[tokio::test]
    async fn coordinator_exits_when_handles_drop() {
        let (ctx, _) = context(CountingSink::default());
        let (handle, task) = spawn_coordinator(ctx, Duration::ZERO);
        handle.start().await.unwrap();
        drop(handle);
        task.await.unwrap();
    }
}
