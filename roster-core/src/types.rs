//! Domain types for the client roster.
//!
//! [`ClientRecord`] is what the database hands over, one row per client
//! identity. [`RosterEntry`] is the deduplicated view the reconciliation
//! engine works with: exactly one entry per [`NormalizedPhone`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phone;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Database identifier of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub i64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for ClientId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Canonical digit-only phone key; the sole identity used to match a client
/// to a sheet row.
///
/// Only constructible through [`NormalizedPhone::parse`], so a value is never
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedPhone(String);

impl NormalizedPhone {
    /// Normalize `raw`; `None` when it contains no digits at all.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = phone::normalize(raw);
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A client as stored in the relational database, with its aggregated
/// document-type tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub full_name: String,
    /// Raw phone exactly as entered; may be missing or non-canonical.
    pub phone: Option<String>,
    /// Messenger account id, used to derive the contact handle.
    pub telegram_id: Option<i64>,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub document_tags: BTreeSet<String>,
    /// Cloud-storage folder id; `None` until the folder is created.
    pub folder_id: Option<String>,
}

/// One logical client per normalized phone, after store-side duplicates
/// have been folded together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Identifier of the first record seen for this phone.
    pub id: ClientId,
    pub phone: NormalizedPhone,
    pub full_name: String,
    pub telegram_id: Option<i64>,
    pub registered_at: DateTime<Utc>,
    pub document_tags: BTreeSet<String>,
    pub folder_id: Option<String>,
    /// Identifiers of further records merged into this entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_ids: Vec<ClientId>,
}

impl RosterEntry {
    /// Start an entry from the first record seen for `phone`.
    pub fn from_record(phone: NormalizedPhone, record: ClientRecord) -> Self {
        Self {
            id: record.id,
            phone,
            full_name: record.full_name,
            telegram_id: record.telegram_id,
            registered_at: record.registered_at,
            document_tags: record.document_tags,
            folder_id: non_empty(record.folder_id),
            merged_ids: Vec::new(),
        }
    }

    /// Fold a store-side duplicate into this entry.
    ///
    /// Tags are unioned; a non-empty folder id or messenger id from either
    /// side wins over a missing one. Name and registration time stay with the
    /// first record.
    pub fn absorb(&mut self, record: ClientRecord) {
        self.document_tags.extend(record.document_tags);
        if self.folder_id.is_none() {
            self.folder_id = non_empty(record.folder_id);
        }
        if self.telegram_id.is_none() {
            self.telegram_id = record.telegram_id;
        }
        if self.full_name.trim().is_empty() {
            self.full_name = record.full_name;
        }
        self.merged_ids.push(record.id);
    }

    pub fn has_document(&self, tag: &str) -> bool {
        self.document_tags.contains(tag)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
