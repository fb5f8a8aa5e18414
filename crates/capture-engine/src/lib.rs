//! Posecap Capture Engine
//!
//! Runs synchronized capture sessions: the rendered overlay is encoded to a
//! video file while every detected pose is buffered as a timestamped row,
//! and the rows are exported as one CSV document when the video completes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  CaptureContext                  │
//! │  ┌──────────────┐ ┌──────────────┐ ┌───────────┐ │
//! │  │ FrameRenderer│ │ Recording    │ │ Capture   │ │
//! │  │ + surface    │ │ Session      │ │ Sink      │ │
//! │  └──────┬───────┘ └──────┬───────┘ └─────┬─────┘ │
//! │         │ frames         │ rows          │       │
//! │         └───────────────►│◄── completion─┘       │
//! │                          ▼                       │
//! │                   Export Serializer              │
//! │                          │                       │
//! │        recording.webm    ▼  keypoints_with_scores.csv
//! └──────────────────────────────────────────────────┘
//! ```

pub mod coordinator;
pub mod export;
pub mod pipeline;
pub mod row;
pub mod session;
pub mod sink;

pub use coordinator::*;
pub use export::*;
pub use session::*;
pub use sink::*;
