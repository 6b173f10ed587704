//! Error types for meeplesync.
//!
//! Library crates use [`MeeplesyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all meeplesync operations.
#[derive(Debug, thiserror::Error)]
pub enum MeeplesyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level network error (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Non-transient HTTP error status. Aborts the run.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// XML or HTML parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// CSV read/write error.
    #[error("csv error: {0}")]
    Csv(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// License manifest or resolution error.
    #[error("license error: {0}")]
    License(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MeeplesyncError>;

impl MeeplesyncError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<csv::Error> for MeeplesyncError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}
