//! Row materializer: a roster entry rendered into the fixed column layout.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use roster_core::schema::{CONTACT_COL, DATE_COL, FOLDER_COL, NAME_COL, PHONE_COL};
use roster_core::{ClientId, NormalizedPhone, RosterEntry, SheetSchema};

use crate::sheet::{CellValue, EMPTY_CELL};

/// Values for every owned column of one row, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPayload(Vec<CellValue>);

impl RowPayload {
    pub fn cells(&self) -> &[CellValue] {
        &self.0
    }

    pub fn into_cells(self) -> Vec<CellValue> {
        self.0
    }

    pub fn get(&self, col: usize) -> &CellValue {
        self.0.get(col).unwrap_or(&EMPTY_CELL)
    }
}

/// A new row destined for the append block.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendRow {
    /// 1-based target row.
    pub row: u32,
    pub client: ClientId,
    pub phone: NormalizedPhone,
    pub full_name: String,
    pub payload: RowPayload,
}

/// Render `entry` for sheet row `row`.
pub fn materialize(entry: &RosterEntry, row: u32, schema: &SheetSchema) -> AppendRow {
    AppendRow {
        row,
        client: entry.id,
        phone: entry.phone.clone(),
        full_name: entry.full_name.clone(),
        payload: row_payload(entry, schema),
    }
}

/// Cell values for `entry` across every owned column.
pub fn row_payload(entry: &RosterEntry, schema: &SheetSchema) -> RowPayload {
    let mut cells = vec![CellValue::Empty; schema.width()];

    cells[DATE_COL] = CellValue::text(format_date(&entry.registered_at, &schema.date_format));
    cells[NAME_COL] = CellValue::text(entry.full_name.trim());
    cells[PHONE_COL] = CellValue::literal(entry.phone.as_str());
    cells[CONTACT_COL] = match entry.telegram_id {
        Some(id) => CellValue::text(format!("{}{id}", schema.contact_prefix)),
        None => CellValue::Empty,
    };
    cells[FOLDER_COL] = match &entry.folder_id {
        Some(folder) => CellValue::text(format!("{}{folder}", schema.folder_url_prefix)),
        None => CellValue::Empty,
    };
    for (i, doc) in schema.document_types.iter().enumerate() {
        cells[schema.doc_col(i)] = CellValue::Bool(entry.has_document(&doc.tag));
    }
    cells[schema.status_col()] = CellValue::text(schema.status_for(&entry.document_tags));

    RowPayload(cells)
}

fn format_date(at: &DateTime<Utc>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", at.format(format)).is_err() {
        out.clear();
        out.push_str(&at.format("%Y-%m-%d").to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use roster_core::schema::FIRST_DOC_COL;
    use roster_core::{ClientRecord, RosterConfig};

    use super::*;

    fn entry(tags: &[&str]) -> RosterEntry {
        let record = ClientRecord {
            id: ClientId(7),
            full_name: " Olena Shevchenko ".to_string(),
            phone: Some("050 123 45 67".to_string()),
            telegram_id: Some(987654),
            registered_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            document_tags: tags.iter().map(|t| t.to_string()).collect(),
            folder_id: Some("abc123".to_string()),
        };
        let phone = NormalizedPhone::parse(record.phone.as_deref().unwrap()).unwrap();
        RosterEntry::from_record(phone, record)
    }

    fn schema() -> SheetSchema {
        SheetSchema::from_config(&RosterConfig::default())
    }

    #[test]
    fn identity_columns_are_rendered() {
        let row = materialize(&entry(&[]), 21, &schema());
        let cells = row.payload.cells();
        assert_eq!(row.row, 21);
        assert_eq!(cells.len(), 19);
        assert_eq!(cells[DATE_COL], CellValue::text("01.03.2024"));
        assert_eq!(cells[NAME_COL], CellValue::text("Olena Shevchenko"));
        assert_eq!(cells[PHONE_COL], CellValue::literal("380501234567"));
        assert_eq!(cells[CONTACT_COL], CellValue::text("@user987654"));
        assert_eq!(
            cells[FOLDER_COL],
            CellValue::text("https://drive.google.com/drive/folders/abc123")
        );
    }

    #[test]
    fn all_false_row_is_valid_and_full_width() {
        let payload = row_payload(&entry(&[]), &schema());
        let flags = &payload.cells()[FIRST_DOC_COL..FIRST_DOC_COL + 13];
        assert!(flags.iter().all(|c| *c == CellValue::Bool(false)));
        assert_eq!(payload.get(18), &CellValue::text("In progress"));
    }

    #[test]
    fn flags_follow_schema_order_not_tag_order() {
        let payload = row_payload(&entry(&["story", "passport", "unknown"]), &schema());
        let flags: Vec<bool> = payload.cells()[FIRST_DOC_COL..18]
            .iter()
            .map(|c| *c == CellValue::Bool(true))
            .collect();
        let mut expected = vec![false; 13];
        expected[0] = true; // passport
        expected[8] = true; // story
        assert_eq!(flags, expected);
    }

    #[test]
    fn missing_contact_and_folder_render_empty() {
        let mut entry = entry(&[]);
        entry.telegram_id = None;
        entry.folder_id = None;
        let payload = row_payload(&entry, &schema());
        assert!(payload.get(CONTACT_COL).is_blank());
        assert!(payload.get(FOLDER_COL).is_blank());
    }
}
