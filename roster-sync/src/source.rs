//! The authoritative client store seam.

use async_trait::async_trait;

use roster_core::ClientRecord;

use crate::error::SourceError;

/// Read-only access to clients and their uploaded document types.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Every client with its aggregated document-type tags, in registration
    /// order. One logical query per call.
    async fn fetch_clients(&self) -> Result<Vec<ClientRecord>, SourceError>;
}
