//! Sink snapshot reader.
//!
//! Reads the sheet once per cycle and indexes data rows by normalized phone.
//! The read spans the owned columns plus the human columns to their right up
//! to `Z`, so a row holding only a note still counts as occupied. A phone may sit on several rows (historical
//! duplicates); the lowest row is canonical. Nothing here is cached across
//! cycles.

use std::collections::HashMap;

use roster_core::schema::PHONE_COL;
use roster_core::{NormalizedPhone, SheetSchema};

use crate::error::SyncError;
use crate::sheet::{SheetSink, SparseRow};

static EMPTY_ROW: SparseRow = SparseRow::new(Vec::new());

/// Columns `A:Z`, scanned to find the last occupied row.
pub const OCCUPANCY_WIDTH: usize = 26;

/// Point-in-time view of the sheet.
#[derive(Debug, Clone, Default)]
pub struct SinkSnapshot {
    /// `rows[i]` is sheet row `i + 1`.
    rows: Vec<SparseRow>,
    index: HashMap<NormalizedPhone, Vec<u32>>,
    last_row: u32,
}

impl SinkSnapshot {
    /// Index `rows` (sheet row 1 first); rows above `first_data_row` are
    /// never keyed.
    pub fn from_rows(rows: Vec<SparseRow>, first_data_row: u32) -> Self {
        let mut index: HashMap<NormalizedPhone, Vec<u32>> = HashMap::new();
        let mut last_occupied = 0;

        for (i, row) in rows.iter().enumerate() {
            let row_index = i as u32 + 1;
            if !row.is_blank() {
                last_occupied = row_index;
            }
            if row_index < first_data_row {
                continue;
            }
            let cell = row.get(PHONE_COL);
            if cell.is_blank() {
                continue;
            }
            match NormalizedPhone::parse(&cell.render()) {
                Some(phone) => index.entry(phone).or_default().push(row_index),
                None => tracing::debug!(row = row_index, "ignoring phone cell without digits"),
            }
        }

        Self {
            rows,
            index,
            last_row: last_occupied.max(first_data_row.saturating_sub(1)),
        }
    }

    /// Ascending rows holding `phone`; the first is canonical.
    pub fn locations(&self, phone: &NormalizedPhone) -> &[u32] {
        self.index.get(phone).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row at 1-based `row`; an empty row when out of range.
    pub fn row(&self, row: u32) -> &SparseRow {
        row.checked_sub(1)
            .and_then(|i| self.rows.get(i as usize))
            .unwrap_or(&EMPTY_ROW)
    }

    /// Highest occupied row, never below the header rows.
    pub fn last_row(&self) -> u32 {
        self.last_row
    }

    /// Number of distinct phones found on the sheet.
    pub fn keyed_phones(&self) -> usize {
        self.index.len()
    }

    /// Number of phones that occupy more than one row.
    pub fn duplicated_phones(&self) -> usize {
        self.index.values().filter(|rows| rows.len() > 1).count()
    }

    /// Whether `row` is blank across the first `width` columns.
    pub fn row_is_blank(&self, row: u32, width: usize) -> bool {
        self.row(row).is_blank_within(0..width)
    }
}

/// Read the sheet from `sink` and index it.
pub async fn read_snapshot(
    sink: &dyn SheetSink,
    schema: &SheetSchema,
) -> Result<SinkSnapshot, SyncError> {
    let rows = sink.read_rows(schema.width().max(OCCUPANCY_WIDTH)).await?;
    let snapshot = SinkSnapshot::from_rows(rows, schema.first_data_row);
    tracing::info!(
        last_row = snapshot.last_row(),
        phones = snapshot.keyed_phones(),
        duplicated = snapshot.duplicated_phones(),
        "sheet snapshot read"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::CellValue;

    fn row_with_phone(phone: CellValue) -> SparseRow {
        SparseRow::new(vec![
            CellValue::text("01.03.2024"),
            CellValue::text("Name"),
            phone,
        ])
    }

    fn phone(raw: &str) -> NormalizedPhone {
        NormalizedPhone::parse(raw).unwrap()
    }

    #[test]
    fn duplicates_are_listed_in_ascending_row_order() {
        let mut rows = vec![SparseRow::new(vec![CellValue::text("Date")])];
        for r in 2..=12 {
            let cell = match r {
                5 => CellValue::text("0501234567"),
                9 => CellValue::Number(380501234567.0),
                12 => CellValue::text("+380 (50) 123-45-67"),
                _ => CellValue::text(format!("06711122{r:02}")),
            };
            rows.push(row_with_phone(cell));
        }
        let snapshot = SinkSnapshot::from_rows(rows, 2);
        assert_eq!(snapshot.locations(&phone("380501234567")), &[5, 9, 12]);
        assert_eq!(snapshot.duplicated_phones(), 1);
        assert_eq!(snapshot.last_row(), 12);
    }

    #[test]
    fn blank_and_garbage_phone_cells_are_not_keyed() {
        let rows = vec![
            SparseRow::new(vec![CellValue::text("Date")]),
            row_with_phone(CellValue::Empty),
            row_with_phone(CellValue::text("n/a")),
            row_with_phone(CellValue::Bool(true)),
            row_with_phone(CellValue::text("0501234567")),
        ];
        let snapshot = SinkSnapshot::from_rows(rows, 2);
        assert_eq!(snapshot.keyed_phones(), 1);
        assert_eq!(snapshot.last_row(), 5);
    }

    #[test]
    fn header_rows_are_never_keyed() {
        let rows = vec![row_with_phone(CellValue::text("0501234567"))];
        let snapshot = SinkSnapshot::from_rows(rows, 2);
        assert_eq!(snapshot.keyed_phones(), 0);
        assert_eq!(snapshot.last_row(), 1);
    }

    #[test]
    fn last_row_ignores_trailing_blank_rows_but_not_header() {
        let snapshot = SinkSnapshot::from_rows(vec![SparseRow::default(); 3], 2);
        assert_eq!(snapshot.last_row(), 1);
        assert!(snapshot.row_is_blank(1, 19));
        assert!(snapshot.row(400).is_empty());
    }

    #[test]
    fn note_beyond_owned_columns_occupies_its_row() {
        let mut note = vec![CellValue::Empty; 19];
        note.push(CellValue::text("call back"));
        let rows = vec![
            SparseRow::new(vec![CellValue::text("Date")]),
            row_with_phone(CellValue::text("0501234567")),
            SparseRow::new(note),
        ];
        let snapshot = SinkSnapshot::from_rows(rows, 2);
        assert_eq!(snapshot.last_row(), 3);
        assert_eq!(snapshot.keyed_phones(), 1);
        assert!(snapshot.row_is_blank(3, 19));
    }

    #[tokio::test]
    async fn read_spans_human_columns_up_to_z() {
        use crate::memory::InMemorySheet;
        use roster_core::RosterConfig;

        let mut in_t = vec![CellValue::Empty; 19];
        in_t.push(CellValue::text("in T"));
        let mut past_z = vec![CellValue::Empty; OCCUPANCY_WIDTH];
        past_z.push(CellValue::text("past Z"));
        let sheet = InMemorySheet::with_rows(vec![vec![CellValue::text("Date")], in_t, past_z], 10);
        let schema = SheetSchema::from_config(&RosterConfig::default());
        let snapshot = read_snapshot(&sheet, &schema).await.unwrap();
        assert_eq!(snapshot.last_row(), 2);
    }
}
