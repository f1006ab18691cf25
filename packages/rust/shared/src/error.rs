//! Error types for leadscout.
//!
//! Library crates use [`LeadScoutError`] via `thiserror` for failures that end a run.
//! Per-item failures (enrichment fetches, link checks, email checks) have their own
//! types next to the code that produces them and never become a `LeadScoutError`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all fatal leadscout operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadScoutError {
    /// Configuration loading or validation error. Raised at startup only.
    #[error("config error: {message}")]
    Config { message: String },

    /// The remote scraping job reached a failed terminal state.
    #[error("remote job {job_id} failed: {detail}")]
    RemoteJobFailed { job_id: String, detail: String },

    /// The remote job did not reach a terminal state within the allowed wait.
    /// The job itself is left running on the provider.
    #[error("remote job {job_id} did not finish within {waited_secs}s")]
    RemoteJobTimedOut { job_id: String, waited_secs: u64 },

    /// The scraping provider rejected a request or returned an unusable payload.
    #[error("provider error: {0}")]
    Provider(String),

    /// The spreadsheet store could not be read or written.
    #[error("store I/O error: {0}")]
    StoreIo(String),

    /// Network/HTTP transport error.
    #[error("network error: {0}")]
    Network(String),

    /// Payload parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input shape, invalid argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadScoutError>;

impl LeadScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
