//! Clock and timing utilities for session timestamps.
//!
//! Every keypoint row is stamped relative to the moment its session
//! became active. This module provides:
//! - A pluggable [`TimeSource`] (monotonic in production, manual in tests
//!   and pose-log replay)
//! - The [`SessionClock`] anchored at session start
//! - Fixed-precision timestamp formatting

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A source of monotonic nanosecond readings.
pub trait TimeSource: Send + Sync {
    /// Current reading in nanoseconds. Only differences are meaningful.
    fn now_ns(&self) -> u64;
}

/// High-resolution monotonic time backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// A manually advanced time source.
///
/// Clones share the same reading, so a test (or the replay driver) can hold
/// one handle while the session holds another.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now_ns: Arc<AtomicU64>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current reading in nanoseconds.
    pub fn set_ns(&self, ns: u64) {
        self.now_ns.store(ns, Ordering::SeqCst);
    }

    /// Set the current reading in milliseconds.
    pub fn set_ms(&self, ms: f64) {
        self.set_ns(ms_to_ns(ms));
    }

    /// Advance the reading by the given number of milliseconds.
    pub fn advance_ms(&self, ms: f64) {
        self.now_ns.fetch_add(ms_to_ns(ms), Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

/// A session clock that provides timestamps relative to a fixed epoch
/// (the moment the session became active).
#[derive(Clone)]
pub struct SessionClock {
    source: Arc<dyn TimeSource>,

    /// Reading of `source` at session start.
    epoch_ns: u64,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl SessionClock {
    /// Create a new session clock anchored to the source's current reading.
    pub fn start(source: Arc<dyn TimeSource>) -> Self {
        let epoch_ns = source.now_ns();
        Self {
            source,
            epoch_ns,
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Nanoseconds elapsed since session start.
    ///
    /// Saturates at zero if the source reports a reading before the epoch.
    pub fn elapsed_ns(&self) -> u64 {
        self.source.now_ns().saturating_sub(self.epoch_ns)
    }

    /// Seconds elapsed since session start.
    pub fn elapsed_secs(&self) -> f64 {
        ns_to_secs(self.elapsed_ns())
    }

    /// Wall-clock time at session start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

impl std::fmt::Debug for SessionClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClock")
            .field("epoch_ns", &self.epoch_ns)
            .field("epoch_wall", &self.epoch_wall)
            .finish()
    }
}

/// Convert nanoseconds to seconds.
pub fn ns_to_secs(ns: u64) -> f64 {
    ns as f64 / 1_000_000_000.0
}

/// Convert milliseconds to nanoseconds, clamping negatives to zero.
pub fn ms_to_ns(ms: f64) -> u64 {
    if !ms.is_finite() || ms <= 0.0 {
        return 0;
    }
    (ms * 1_000_000.0).round() as u64
}

/// Format seconds with exactly three decimal places (`0.250`).
pub fn format_timestamp_secs(secs: f64) -> String {
    format!("{secs:.3}")
}
