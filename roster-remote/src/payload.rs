//! JSON shapes of the Sheets v4 REST API.
//!
//! Pure conversions between [`CellValue`]s and request/response bodies, kept
//! apart from the transport so they can be tested without a network.

use serde::Deserialize;
use serde_json::{json, Value};

use roster_sync::{CellValue, RangeWrite, SinkError, SparseRow};

/// `valueInputOption` for every write.
pub const USER_ENTERED: &str = "USER_ENTERED";

/// Prefixes the sheet would interpret as a formula under user-entered input.
const FORMULA_PREFIXES: [char; 5] = ['=', '+', '-', '@', '\''];

/// JSON value for one cell write.
///
/// Text that would be parsed as a formula, and every literal cell, is
/// prefixed with an apostrophe so the sheet stores it as typed. Empty cells
/// are sent as `""`, which clears them.
pub fn cell_to_json(cell: &CellValue) -> Value {
    match cell {
        CellValue::Empty => Value::String(String::new()),
        CellValue::Bool(b) => Value::Bool(*b),
        CellValue::Number(n) => json!(n),
        CellValue::Text(text) if text.starts_with(FORMULA_PREFIXES) => {
            Value::String(format!("'{text}"))
        }
        CellValue::Text(text) => Value::String(text.clone()),
        CellValue::Literal(text) => Value::String(format!("'{text}")),
    }
}

/// Cell read with `valueRenderOption=UNFORMATTED_VALUE`.
pub fn cell_from_json(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Bool(b) => CellValue::Bool(*b),
        Value::Number(n) => n.as_f64().map_or(CellValue::Empty, CellValue::Number),
        Value::String(s) => CellValue::text(s.as_str()),
        other => CellValue::text(other.to_string()),
    }
}

fn rows_to_json(rows: &[Vec<CellValue>]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| row.iter().map(cell_to_json).collect())
        .collect()
}

/// Body of `values.update` for one contiguous block.
pub fn value_range_body(sheet: &str, write: &RangeWrite) -> Value {
    json!({
        "range": write.range.to_a1(sheet),
        "majorDimension": "ROWS",
        "values": rows_to_json(&write.values),
    })
}

/// Body of `values.batchUpdate`.
pub fn batch_update_body(sheet: &str, writes: &[RangeWrite]) -> Value {
    let data: Vec<Value> = writes.iter().map(|w| value_range_body(sheet, w)).collect();
    json!({
        "valueInputOption": USER_ENTERED,
        "data": data,
    })
}

/// Body of `spreadsheets.batchUpdate` appending `rows` empty rows.
pub fn append_rows_body(sheet_id: i64, rows: u32) -> Value {
    json!({
        "requests": [{
            "appendDimension": {
                "sheetId": sheet_id,
                "dimension": "ROWS",
                "length": rows,
            }
        }]
    })
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Rows of a `values.get` response; an absent `values` means an empty sheet.
pub fn parse_value_range(body: &str) -> Result<Vec<SparseRow>, SinkError> {
    let range: ValueRange =
        serde_json::from_str(body).map_err(|e| SinkError::Decode(format!("value range: {e}")))?;
    Ok(range
        .values
        .iter()
        .map(|row| SparseRow::new(row.iter().map(cell_from_json).collect()))
        .collect())
}

/// Grid properties of one worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub row_count: u32,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetMetaProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetMetaProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: Option<GridProperties>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: u32,
}

/// Find worksheet `title` in a `spreadsheets.get?fields=sheets.properties` body.
pub fn parse_sheet_properties(body: &str, title: &str) -> Result<SheetProperties, SinkError> {
    let meta: SpreadsheetMeta = serde_json::from_str(body)
        .map_err(|e| SinkError::Decode(format!("spreadsheet metadata: {e}")))?;
    meta.sheets
        .into_iter()
        .map(|sheet| sheet.properties)
        .find(|props| props.title == title)
        .map(|props| SheetProperties {
            sheet_id: props.sheet_id,
            row_count: props.grid_properties.map_or(0, |g| g.row_count),
        })
        .ok_or_else(|| SinkError::SheetNotFound(title.to_string()))
}

/// Human-readable message from an API error body.
pub fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: ErrorBody,
    }
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.chars().take(200).collect(),
    }
}
