//! Posecap Common Utilities
//!
//! Shared infrastructure for all Posecap crates:
//! - Error types and result aliases
//! - Session clock and pluggable time sources
//! - Tracing/logging initialization
//! - Configuration loading and validation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
