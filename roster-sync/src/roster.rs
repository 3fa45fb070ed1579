//! Roster loader: store records folded into one entry per normalized phone.

use std::collections::HashMap;

use roster_core::{ClientRecord, NormalizedPhone, RosterEntry};

use crate::error::SyncError;
use crate::source::RosterSource;

/// A loaded roster plus how many store records went into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    pub entries: Vec<RosterEntry>,
    pub fetched: usize,
    /// Records without a usable phone.
    pub skipped: usize,
}

impl Roster {
    /// Records folded into an earlier entry with the same phone.
    pub fn merged(&self) -> usize {
        self.fetched - self.skipped - self.entries.len()
    }
}

/// Fetch every client from `source` and merge store-side duplicates.
pub async fn load_roster(source: &dyn RosterSource) -> Result<Roster, SyncError> {
    let records = source.fetch_clients().await?;
    let roster = merge_records(records);
    tracing::info!(
        fetched = roster.fetched,
        entries = roster.entries.len(),
        skipped = roster.skipped,
        "roster loaded"
    );
    Ok(roster)
}

/// Fold `records` by normalized phone, keeping first-seen order.
///
/// Records without a phone, or whose phone has no digits, are dropped.
pub fn merge_records(records: Vec<ClientRecord>) -> Roster {
    let fetched = records.len();
    let mut entries: Vec<RosterEntry> = Vec::new();
    let mut by_phone: HashMap<NormalizedPhone, usize> = HashMap::new();
    let mut skipped = 0;

    for record in records {
        let Some(phone) = record.phone.as_deref().and_then(NormalizedPhone::parse) else {
            tracing::debug!(client = %record.id, "skipping client without phone");
            skipped += 1;
            continue;
        };
        match by_phone.get(&phone) {
            Some(&index) => {
                tracing::debug!(client = %record.id, %phone, "merging duplicate client");
                entries[index].absorb(record);
            }
            None => {
                by_phone.insert(phone.clone(), entries.len());
                entries.push(RosterEntry::from_record(phone, record));
            }
        }
    }

    Roster {
        entries,
        fetched,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{TimeZone, Utc};
    use roster_core::{ClientId, ClientRecord};

    use super::*;

    fn record(id: i64, phone: Option<&str>, tags: &[&str]) -> ClientRecord {
        ClientRecord {
            id: ClientId(id),
            full_name: format!("Client {id}"),
            phone: phone.map(str::to_string),
            telegram_id: None,
            registered_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            document_tags: tags.iter().map(|t| t.to_string()).collect(),
            folder_id: None,
        }
    }

    #[test]
    fn records_without_phone_are_skipped() {
        let roster = merge_records(vec![
            record(1, None, &[]),
            record(2, Some("n/a"), &[]),
            record(3, Some("0501234567"), &[]),
        ]);
        assert_eq!(roster.entries.len(), 1);
        assert_eq!(roster.skipped, 2);
        assert_eq!(roster.entries[0].id, ClientId(3));
    }

    #[test]
    fn duplicates_merge_across_phone_formats() {
        let roster = merge_records(vec![
            record(1, Some("+380 50 123 45 67"), &["a", "b"]),
            record(2, Some("0671112233"), &[]),
            record(3, Some("050-123-45-67"), &["b", "c"]),
        ]);
        assert_eq!(roster.entries.len(), 2);
        assert_eq!(roster.merged(), 1);

        let merged = &roster.entries[0];
        assert_eq!(merged.phone.as_str(), "380501234567");
        let expected: BTreeSet<String> = ["a", "b", "c"].iter().map(|t| t.to_string()).collect();
        assert_eq!(merged.document_tags, expected);
        assert_eq!(merged.merged_ids, vec![ClientId(3)]);
        assert_eq!(roster.entries[1].phone.as_str(), "380671112233");
    }
}
