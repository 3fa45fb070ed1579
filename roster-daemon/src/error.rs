use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, control protocol and cycle lease.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] roster_core::ConfigError),

    #[error("remote setup error: {0}")]
    Remote(#[from] roster_remote::RemoteError),

    #[error("sync error: {0}")]
    Sync(#[from] roster_sync::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("another cycle holds the lease at {path}")]
    LeaseBusy { path: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
