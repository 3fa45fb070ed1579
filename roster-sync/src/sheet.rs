//! Typed view of spreadsheet cells and the [`SheetSink`] seam.
//!
//! The sheet API hands back ragged rows of loosely typed values. They are
//! modelled as [`SparseRow`]s whose out-of-range reads yield
//! [`CellValue::Empty`], so planners never index past a short row.

use std::ops::Range;

use async_trait::async_trait;

use roster_core::schema::column_letter;

use crate::error::SinkError;

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// One cell value as read from or written to the sheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Text the sheet must store as typed: never coerced into a number,
    /// date or formula. Only ever written; reads come back as [`CellValue::Text`].
    Literal(String),
}

impl CellValue {
    /// Text cell; an empty string becomes [`CellValue::Empty`].
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }

    /// Literal text cell; an empty string becomes [`CellValue::Empty`].
    pub fn literal(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Literal(value)
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) | Self::Literal(text) => text.trim().is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Display form used for comparisons.
    ///
    /// Booleans render as `TRUE`/`FALSE` (also when stored as text),
    /// integral numbers without a fractional part, text trimmed.
    pub fn render(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            Self::Number(n) => n.to_string(),
            Self::Text(text) => {
                let text = text.trim();
                if text.eq_ignore_ascii_case("true") {
                    "TRUE".to_string()
                } else if text.eq_ignore_ascii_case("false") {
                    "FALSE".to_string()
                } else {
                    text.to_string()
                }
            }
            Self::Literal(text) => text.trim().to_string(),
        }
    }

    /// Whether the sheet would show the same thing for both values.
    pub fn same_as(&self, other: &CellValue) -> bool {
        self.render() == other.render()
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

pub(crate) static EMPTY_CELL: CellValue = CellValue::Empty;

/// One sheet row, possibly shorter than the schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseRow {
    cells: Vec<CellValue>,
}

impl SparseRow {
    pub const fn new(cells: Vec<CellValue>) -> Self {
        Self { cells }
    }

    /// Cell at 0-based `col`; [`CellValue::Empty`] past the end of the row.
    pub fn get(&self, col: usize) -> &CellValue {
        self.cells.get(col).unwrap_or(&EMPTY_CELL)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(CellValue::is_blank)
    }

    pub fn is_blank_within(&self, cols: Range<usize>) -> bool {
        cols.into_iter().all(|col| self.get(col).is_blank())
    }

    pub fn cells(&self) -> &[CellValue] {
        &self.cells
    }
}

impl From<Vec<CellValue>> for SparseRow {
    fn from(cells: Vec<CellValue>) -> Self {
        Self::new(cells)
    }
}

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

/// Rectangle of cells: 1-based rows, 0-based columns, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: usize,
    pub last_col: usize,
}

impl CellRange {
    /// A1 notation on `sheet`, e.g. `'Clients'!B5:S5`.
    pub fn to_a1(&self, sheet: &str) -> String {
        format!(
            "{}!{}{}:{}{}",
            quote_sheet_name(sheet),
            column_letter(self.first_col),
            self.first_row,
            column_letter(self.last_col),
            self.last_row
        )
    }

    pub fn row_count(&self) -> u32 {
        self.last_row - self.first_row + 1
    }
}

/// Quote a worksheet title for use in A1 notation.
pub fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Values destined for one rectangular range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeWrite {
    pub range: CellRange,
    /// Row-major values; each inner vector spans the range's columns.
    pub values: Vec<Vec<CellValue>>,
}

impl RangeWrite {
    /// Single-row write starting at `first_col`.
    pub fn row(row: u32, first_col: usize, cells: Vec<CellValue>) -> Self {
        Self::block(row, first_col, vec![cells])
    }

    /// Contiguous multi-row write starting at (`first_row`, `first_col`).
    pub fn block(first_row: u32, first_col: usize, rows: Vec<Vec<CellValue>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let height = rows.len().max(1) as u32;
        Self {
            range: CellRange {
                first_row,
                last_row: first_row + height - 1,
                first_col,
                last_col: first_col + width - 1,
            },
            values: rows,
        }
    }
}

// ---------------------------------------------------------------------------
// Sink seam
// ---------------------------------------------------------------------------

/// The spreadsheet the roster is mirrored into.
///
/// Every write uses user-entered semantics: values are interpreted as if
/// typed into the sheet by hand.
#[async_trait]
pub trait SheetSink: Send + Sync {
    /// Rows 1 through the last occupied row, limited to the first `width`
    /// columns. Trailing blank rows and cells may be omitted.
    async fn read_rows(&self, width: usize) -> Result<Vec<SparseRow>, SinkError>;

    /// Current number of rows in the grid.
    async fn row_capacity(&self) -> Result<u32, SinkError>;

    /// Append `additional` empty rows to the grid.
    async fn grow_rows(&self, additional: u32) -> Result<(), SinkError>;

    /// Write several ranges in one request.
    async fn batch_write(&self, writes: &[RangeWrite]) -> Result<(), SinkError>;

    /// Write one contiguous block.
    async fn write_block(&self, block: &RangeWrite) -> Result<(), SinkError>;
}
