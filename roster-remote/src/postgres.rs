//! PostgreSQL roster source.
//!
//! One aggregate query per cycle: every client joined with the distinct
//! document types it has uploaded. The e-signature password lives in its own
//! table and is folded in as the `ecpass` tag.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use secrecy::{ExposeSecret, SecretString};
use tokio_postgres::{NoTls, Row};

use roster_core::{ClientId, ClientRecord};
use roster_sync::{RosterSource, SourceError};

use crate::error::RemoteError;

const POOL_SIZE: usize = 4;

/// Tag recorded when a client has stored an e-signature password.
pub const EC_PASSWORD_TAG: &str = "ecpass";

/// Roster query against the tables in `schema`.
///
/// `schema` must be a plain identifier; config validation enforces that.
pub fn roster_query(schema: &str) -> String {
    format!(
        "SELECT c.id::bigint AS id, \
                COALESCE(c.full_name, '') AS full_name, \
                c.phone::text AS phone, \
                c.telegram_id::bigint AS telegram_id, \
                c.created_at::timestamptz AS registered_at, \
                c.drive_folder_id::text AS folder_id, \
                COALESCE(ARRAY_AGG(DISTINCT d.document_type::text) \
                         FILTER (WHERE d.document_type IS NOT NULL), '{{}}')::text[] AS document_types, \
                EXISTS (SELECT 1 FROM {schema}.ec_passwords p WHERE p.client_id = c.id) AS has_ec_password \
         FROM {schema}.clients c \
         LEFT JOIN {schema}.documents d ON d.client_id = c.id \
         GROUP BY c.id \
         ORDER BY c.created_at ASC NULLS LAST, c.id ASC"
    )
}

/// Reads the roster through a small connection pool.
pub struct PgRosterSource {
    pool: Pool,
    query: String,
}

impl PgRosterSource {
    /// Build a pool for `database_url`. No connection is opened until the
    /// first fetch.
    pub fn connect(database_url: &SecretString, schema: &str) -> Result<Self, RemoteError> {
        let pg_config: tokio_postgres::Config = database_url
            .expose_secret()
            .parse()
            .map_err(|e: tokio_postgres::Error| RemoteError::InvalidDatabaseUrl(e.to_string()))?;
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| RemoteError::Pool(e.to_string()))?;
        Ok(Self {
            pool,
            query: roster_query(schema),
        })
    }
}

#[async_trait]
impl RosterSource for PgRosterSource {
    async fn fetch_clients(&self) -> Result<Vec<ClientRecord>, SourceError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SourceError::Pool(e.to_string()))?;
        let rows = client
            .query(self.query.as_str(), &[])
            .await
            .map_err(|e| SourceError::Query(e.to_string()))?;
        tracing::debug!(rows = rows.len(), "roster query returned");
        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &Row) -> Result<ClientRecord, SourceError> {
    let id: i64 = row.try_get("id").map_err(decode("id"))?;
    let full_name: String = row.try_get("full_name").map_err(decode("full_name"))?;
    let phone: Option<String> = row.try_get("phone").map_err(decode("phone"))?;
    let telegram_id: Option<i64> = row.try_get("telegram_id").map_err(decode("telegram_id"))?;
    let created_at: Option<DateTime<Utc>> =
        row.try_get("registered_at").map_err(decode("registered_at"))?;
    let folder_id: Option<String> = row.try_get("folder_id").map_err(decode("folder_id"))?;
    let document_types: Vec<String> =
        row.try_get("document_types").map_err(decode("document_types"))?;
    let has_ec_password: bool = row
        .try_get("has_ec_password")
        .map_err(decode("has_ec_password"))?;

    Ok(ClientRecord {
        id: ClientId(id),
        full_name,
        phone,
        telegram_id,
        registered_at: registration_time(id, created_at, Utc::now()),
        document_tags: document_tags(document_types, has_ec_password),
        folder_id,
    })
}

/// Stored registration time; a client without one is dated `now`.
pub fn registration_time(
    id: i64,
    created_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    created_at.unwrap_or_else(|| {
        tracing::warn!(client = id, "client has no registration time; using now");
        now
    })
}

/// Uploaded document types plus the derived password tag.
pub fn document_tags(uploaded: Vec<String>, has_ec_password: bool) -> BTreeSet<String> {
    let mut tags: BTreeSet<String> = uploaded
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if has_ec_password {
        tags.insert(EC_PASSWORD_TAG.to_string());
    }
    tags
}

fn decode(column: &'static str) -> impl Fn(tokio_postgres::Error) -> SourceError {
    move |e| SourceError::Decode {
        column,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_targets_configured_schema_in_registration_order() {
        let sql = roster_query("intake");
        assert!(sql.contains("FROM intake.clients c"));
        assert!(sql.contains("LEFT JOIN intake.documents d"));
        assert!(sql.contains("intake.ec_passwords"));
        assert!(sql.contains("ORDER BY c.created_at ASC NULLS LAST, c.id ASC"));
        assert!(sql.contains("'{}'"), "empty array literal must survive formatting");
        assert!(!sql.contains("docbot"));
    }

    #[test]
    fn password_table_adds_ecpass_tag() {
        let tags = document_tags(vec!["passport".into(), " ".into()], true);
        let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["ecpass", "passport"]);
    }

    #[test]
    fn missing_registration_time_falls_back_to_now() {
        use chrono::TimeZone;

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let stored = Utc.with_ymd_and_hms(2023, 11, 5, 8, 15, 0).unwrap();
        assert_eq!(registration_time(1, Some(stored), now), stored);
        assert_eq!(registration_time(2, None, now), now);
    }

    #[test]
    fn malformed_url_is_rejected() {
        let url = SecretString::from("postgres://user@host:notaport/db".to_string());
        assert!(matches!(
            PgRosterSource::connect(&url, "docbot"),
            Err(RemoteError::InvalidDatabaseUrl(_))
        ));
    }
}
