//! Recording session state machine.
//!
//! ```text
//!            start()                 stop()
//!   Idle ──────────────► Active ──────────────► Finalizing
//!    ▲                   │   ▲                      │
//!    │                   └───┘ start() (restart,    │
//!    │                         discards rows)       │
//!    └──────────────────────────────────────────────┘
//!                 finish() once the capture sink completes
//! ```
//!
//! Rows are buffered only while `Active` and are handed off as a single
//! [`ExportDocument`] by `finish()`. While `Idle` the buffer is empty and
//! there is no session clock.

use std::sync::Arc;

use serde::Serialize;

use posecap_common::clock::{SessionClock, TimeSource};
use posecap_common::config::DEFAULT_EXPORT_FILE_NAME;
use posecap_common::error::{PosecapError, PosecapResult};
use posecap_pose_model::{KeypointSchema, Pose, ScoreThreshold};

use crate::export::ExportDocument;
use crate::row::build_row;

/// State of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No capture in progress.
    Idle,
    /// Recording frames.
    Active,
    /// Stop requested; waiting for the capture sink to complete.
    Finalizing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Result of a successful `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The session was already active; its unexported rows were dropped.
    Restarted { discarded_rows: usize },
}

/// Result of `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Now finalizing with this many buffered rows.
    Finalizing { rows: usize },
    /// Nothing to stop; the session stayed in the given state.
    Ignored(SessionState),
}

/// Result of `record_frame()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// Session is not active.
    NotActive,
    /// The detector reported no keypoints for this pose.
    NoKeypoints,
}

/// Buffers timestamped keypoint rows between `start()` and `finish()`.
pub struct RecordingSession {
    schema: KeypointSchema,
    time: Arc<dyn TimeSource>,
    export_file_name: String,
    state: SessionState,
    clock: Option<SessionClock>,
    rows: Vec<String>,
}

impl RecordingSession {
    pub fn new(schema: KeypointSchema, time: Arc<dyn TimeSource>) -> Self {
        Self {
            schema,
            time,
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
            state: SessionState::Idle,
            clock: None,
            rows: Vec::new(),
        }
    }

    pub fn with_export_file_name(mut self, name: impl Into<String>) -> Self {
        self.export_file_name = name.into();
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn schema(&self) -> &KeypointSchema {
        &self.schema
    }

    /// Rows buffered in the current session.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Seconds since the session became active, if it has a clock.
    pub fn elapsed_secs(&self) -> Option<f64> {
        self.clock.as_ref().map(SessionClock::elapsed_secs)
    }

    pub fn clock(&self) -> Option<&SessionClock> {
        self.clock.as_ref()
    }

    /// Begin a fresh session.
    ///
    /// Restarting an active session discards its unexported rows. Starting
    /// while finalizing is rejected; the caller must wait for `finish()`.
    pub fn start(&mut self) -> PosecapResult<StartOutcome> {
        let outcome = match self.state {
            SessionState::Finalizing => {
                return Err(PosecapError::session_busy(
                    "Previous session is still finalizing its export",
                ));
            }
            SessionState::Active => {
                let discarded_rows = self.rows.len();
                tracing::warn!(discarded_rows, "Restarting active session; unexported rows dropped");
                StartOutcome::Restarted { discarded_rows }
            }
            SessionState::Idle => StartOutcome::Started,
        };

        self.rows.clear();
        let clock = SessionClock::start(self.time.clone());
        tracing::info!(epoch_wall = %clock.epoch_wall(), "Recording session started");
        self.clock = Some(clock);
        self.state = SessionState::Active;
        Ok(outcome)
    }

    /// Request the end of the session. Never blocks and never fails.
    pub fn stop(&mut self) -> StopOutcome {
        if self.state != SessionState::Active {
            tracing::debug!(state = %self.state, "Stop ignored; session not active");
            return StopOutcome::Ignored(self.state);
        }
        let rows = self.rows.len();
        tracing::info!(
            rows,
            duration_secs = self.elapsed_secs().unwrap_or(0.0),
            "Recording stopped; finalizing"
        );
        self.state = SessionState::Finalizing;
        StopOutcome::Finalizing { rows }
    }

    /// Append a row for one pose.
    ///
    /// Poses without keypoints are skipped. A pose whose keypoint count does
    /// not match the schema is rejected with [`PosecapError::Schema`] and
    /// nothing is appended.
    pub fn record_frame(
        &mut self,
        pose: &Pose,
        threshold: ScoreThreshold,
    ) -> PosecapResult<RecordOutcome> {
        if self.state != SessionState::Active {
            return Ok(RecordOutcome::NotActive);
        }
        let Some(keypoints) = pose.detected_keypoints() else {
            tracing::trace!("Frame without keypoints skipped");
            return Ok(RecordOutcome::NoKeypoints);
        };
        self.schema.validate(pose)?;

        let elapsed = self.elapsed_secs().unwrap_or(0.0);
        self.rows.push(build_row(elapsed, keypoints, threshold));
        Ok(RecordOutcome::Recorded)
    }

    /// Complete finalization once the capture sink has finished.
    ///
    /// Returns the export document, or `None` when no rows were recorded.
    /// Either way the session returns to `Idle`.
    pub fn finish(&mut self) -> PosecapResult<Option<ExportDocument>> {
        if self.state != SessionState::Finalizing {
            return Err(PosecapError::invalid_transition(format!(
                "finish() requires a finalizing session, state is {}",
                self.state
            )));
        }
        let rows = std::mem::take(&mut self.rows);
        self.clock = None;
        self.state = SessionState::Idle;

        if rows.is_empty() {
            tracing::info!("No keypoints data to export");
            return Ok(None);
        }
        Ok(Some(ExportDocument::new(
            &self.schema,
            &rows,
            self.export_file_name.clone(),
        )))
    }

    /// Drop everything and return to `Idle`, e.g. after the capture sink
    /// failed to start. Returns the number of rows discarded.
    pub fn abandon(&mut self) -> usize {
        let discarded = self.rows.len();
        self.rows.clear();
        self.clock = None;
        self.state = SessionState::Idle;
        discarded
    }
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("state", &self.state)
            .field("rows", &self.rows.len())
            .field("clock", &self.clock)
            .finish()
    }
}
