//! Error types for roster-sync.

use std::path::PathBuf;

use thiserror::Error;

use roster_core::ConfigError;

/// Failures reading the authoritative client store.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No connection could be checked out of the pool.
    #[error("database pool error: {0}")]
    Pool(String),

    #[error("roster query failed: {0}")]
    Query(String),

    /// A column held a value the roster model cannot represent.
    #[error("unexpected value in column '{column}': {message}")]
    Decode {
        column: &'static str,
        message: String,
    },

    #[error("roster source unavailable: {0}")]
    Unavailable(String),
}

/// Failures talking to the spreadsheet.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The API answered with a non-success status.
    #[error("sheet API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("sheet transport error: {0}")]
    Transport(String),

    #[error("sheet authorization failed: {0}")]
    Auth(String),

    /// The response body did not have the expected shape.
    #[error("unexpected sheet response: {0}")]
    Decode(String),

    #[error("worksheet '{0}' not found in spreadsheet")]
    SheetNotFound(String),
}

/// All errors that can abort a reconciliation cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("roster source error: {0}")]
    Source(#[from] SourceError),

    #[error("sheet sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (cycle report store).
    #[error("cycle report JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
