//! Error types shared across Posecap crates.

use std::path::PathBuf;

/// Top-level error type for Posecap operations.
#[derive(Debug, thiserror::Error)]
pub enum PosecapError {
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Export error: {message}")]
    Export { message: String },

    #[error("Schema mismatch: {message}")]
    Schema { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A session is still finalizing its previous recording.
    #[error("Session busy: {message}")]
    SessionBusy { message: String },

    #[error("Invalid state transition: {message}")]
    InvalidTransition { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PosecapError.
pub type PosecapResult<T> = Result<T, PosecapError>;

impl PosecapError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export {
            message: msg.into(),
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn session_busy(msg: impl Into<String>) -> Self {
        Self::SessionBusy {
            message: msg.into(),
        }
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}
