//! Error types for roster-remote.

use thiserror::Error;

use roster_core::ConfigError;

/// Failures while building the remote adapters. Runtime failures are
/// reported through `SourceError` / `SinkError` instead.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid DATABASE_URL: {0}")]
    InvalidDatabaseUrl(String),

    #[error("failed to build database pool: {0}")]
    Pool(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
