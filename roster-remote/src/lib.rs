//! # roster-remote
//!
//! Production adapters for the reconciliation engine: the PostgreSQL
//! [`PgRosterSource`] and the Google Sheets [`GoogleSheetsSink`].
//!
//! [`connect`] wires both into a [`SyncContext`] from config and secrets.

pub mod auth;
pub mod error;
pub mod payload;
pub mod postgres;
pub mod sheets;

use std::sync::Arc;

use roster_core::{RosterConfig, Secrets};
use roster_sync::SyncContext;

pub use auth::TokenCache;
pub use error::RemoteError;
pub use postgres::PgRosterSource;
pub use sheets::{GoogleSheetsSink, RetryPolicy};

/// Build the process-wide context from validated settings and secrets.
pub fn connect(config: RosterConfig, secrets: Secrets) -> Result<SyncContext, RemoteError> {
    config.validate()?;
    let source = PgRosterSource::connect(&secrets.database_url, &config.database_schema)?;
    let tokens = Arc::new(TokenCache::new(secrets.google));
    let sink = GoogleSheetsSink::new(&config.spreadsheet_id, &config.sheet_name, tokens)?;
    tracing::info!(
        spreadsheet = %config.spreadsheet_id,
        sheet = %config.sheet_name,
        "remote adapters ready"
    );
    Ok(SyncContext::new(config, Arc::new(source), Arc::new(sink)))
}
