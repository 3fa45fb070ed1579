//! Column layout of the dashboard sheet.
//!
//! ```text
//! A date | B name | C phone | D contact | E folder | doc flags … | status | (human columns)
//! ```
//!
//! The layout is fixed for a given config: one checkbox column per tracked
//! document type, in config order, followed by the status column. Anything
//! to the right of the status column belongs to people and is never written.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use crate::config::{DocumentTypeConfig, RosterConfig, StatusLabels};

pub const DATE_COL: usize = 0;
pub const NAME_COL: usize = 1;
pub const PHONE_COL: usize = 2;
pub const CONTACT_COL: usize = 3;
pub const FOLDER_COL: usize = 4;
pub const FIRST_DOC_COL: usize = 5;

const IDENTITY_HEADERS: [&str; FIRST_DOC_COL] = ["Date", "Full name", "Phone", "Telegram", "Folder"];
const STATUS_HEADER: &str = "Status";

/// Resolved sheet layout plus the formatting rules for each column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSchema {
    pub sheet_name: String,
    pub first_data_row: u32,
    pub document_types: Vec<DocumentTypeConfig>,
    pub date_format: String,
    pub contact_prefix: String,
    pub folder_url_prefix: String,
    pub status_labels: StatusLabels,
}

impl SheetSchema {
    pub fn from_config(config: &RosterConfig) -> Self {
        Self {
            sheet_name: config.sheet_name.clone(),
            first_data_row: config.first_data_row,
            document_types: config.document_types.clone(),
            date_format: config.date_format.clone(),
            contact_prefix: config.contact_prefix.clone(),
            folder_url_prefix: config.folder_url_prefix.clone(),
            status_labels: config.status_labels.clone(),
        }
    }

    /// Number of columns the engine owns.
    pub fn width(&self) -> usize {
        FIRST_DOC_COL + self.document_types.len() + 1
    }

    pub fn doc_col(&self, index: usize) -> usize {
        FIRST_DOC_COL + index
    }

    pub fn status_col(&self) -> usize {
        FIRST_DOC_COL + self.document_types.len()
    }

    /// Columns an update may overwrite. The registration date is written
    /// once, on append.
    pub fn mutable_cols(&self) -> RangeInclusive<usize> {
        NAME_COL..=self.status_col()
    }

    /// Header row index, or `None` when data starts at row 1.
    pub fn header_row(&self) -> Option<u32> {
        self.first_data_row.checked_sub(1).filter(|row| *row >= 1)
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = IDENTITY_HEADERS.iter().map(|h| h.to_string()).collect();
        headers.extend(self.document_types.iter().map(|d| d.header.clone()));
        headers.push(STATUS_HEADER.to_string());
        headers
    }

    /// Letter of the last owned column (e.g. `S` with 13 document types).
    pub fn last_column_letter(&self) -> String {
        column_letter(self.width() - 1)
    }

    /// Status label for a client holding `tags`.
    ///
    /// Complete when every required type is present; when no type is marked
    /// required, every tracked type must be present.
    pub fn status_for(&self, tags: &BTreeSet<String>) -> &str {
        let mut required = self.document_types.iter().filter(|d| d.required).peekable();
        let complete = if required.peek().is_some() {
            required.all(|d| tags.contains(&d.tag))
        } else {
            self.document_types.iter().all(|d| tags.contains(&d.tag))
        };
        if complete {
            &self.status_labels.complete
        } else {
            &self.status_labels.in_progress
        }
    }
}

/// Spreadsheet column letter for a 0-based index (`0 → A`, `26 → AA`).
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SheetSchema {
        SheetSchema::from_config(&RosterConfig::default())
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn default_layout_ends_at_status_column_s() {
        let schema = schema();
        assert_eq!(schema.width(), 19);
        assert_eq!(schema.status_col(), 18);
        assert_eq!(schema.last_column_letter(), "S");
        assert_eq!(schema.headers().len(), schema.width());
        assert_eq!(schema.mutable_cols(), NAME_COL..=18);
    }

    #[test]
    fn header_row_is_absent_when_data_starts_at_row_one() {
        let mut schema = schema();
        assert_eq!(schema.header_row(), Some(1));
        schema.first_data_row = 1;
        assert_eq!(schema.header_row(), None);
    }

    #[test]
    fn status_requires_every_required_type() {
        let schema = schema();
        let required: BTreeSet<String> = schema
            .document_types
            .iter()
            .filter(|d| d.required)
            .map(|d| d.tag.clone())
            .collect();
        assert_eq!(schema.status_for(&required), "Complete");

        let mut missing = required.clone();
        missing.remove("passport");
        assert_eq!(schema.status_for(&missing), "In progress");
    }

    #[test]
    fn status_without_required_types_needs_all_tracked() {
        let mut schema = schema();
        for doc in &mut schema.document_types {
            doc.required = false;
        }
        let all: BTreeSet<String> = schema.document_types.iter().map(|d| d.tag.clone()).collect();
        assert_eq!(schema.status_for(&all), "Complete");
        assert_eq!(schema.status_for(&BTreeSet::new()), "In progress");
    }
}
