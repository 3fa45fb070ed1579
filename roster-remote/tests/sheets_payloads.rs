//! Request and response shaping for the Sheets API, without a network.

use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

use roster_remote::payload::{
    api_error_message, append_rows_body, batch_update_body, cell_from_json, cell_to_json,
    parse_sheet_properties, parse_value_range, value_range_body,
};
use roster_sync::{CellValue, RangeWrite, SinkError};

// ---------------------------------------------------------------------------
// 1. Cell conversion
// ---------------------------------------------------------------------------

#[rstest]
#[case::empty_clears(CellValue::Empty, json!(""))]
#[case::checkbox(CellValue::Bool(true), json!(true))]
#[case::plain_text(CellValue::text("Olena"), json!("Olena"))]
#[case::formula_is_escaped(CellValue::text("=HYPERLINK(\"x\")"), json!("'=HYPERLINK(\"x\")"))]
#[case::plus_is_escaped(CellValue::text("+380501234567"), json!("'+380501234567"))]
#[case::digits_stay_text(CellValue::text("380501234567"), json!("380501234567"))]
#[case::literal_is_escaped(CellValue::literal("44770090012305019"), json!("'44770090012305019"))]
#[case::minus_is_escaped(CellValue::text("-Olena"), json!("'-Olena"))]
#[case::at_is_escaped(CellValue::text("@Olena"), json!("'@Olena"))]
fn cells_serialize_for_user_entered_input(#[case] cell: CellValue, #[case] expected: serde_json::Value) {
    assert_eq!(cell_to_json(&cell), expected);
}

#[test]
fn unformatted_values_map_back_to_cells() {
    assert_eq!(cell_from_json(&json!(380501234567u64)), CellValue::Number(380501234567.0));
    assert_eq!(cell_from_json(&json!(false)), CellValue::Bool(false));
    assert_eq!(cell_from_json(&json!("")), CellValue::Empty);
    assert_eq!(cell_from_json(&json!(null)), CellValue::Empty);
}

// ---------------------------------------------------------------------------
// 2. Request bodies
// ---------------------------------------------------------------------------

#[test]
fn batch_update_uses_user_entered_and_a1_ranges() {
    let writes = vec![
        RangeWrite::row(9, 0, vec![CellValue::Empty; 3]),
        RangeWrite::row(5, 1, vec![CellValue::text("Olena"), CellValue::Bool(true)]),
    ];
    let body = batch_update_body("Clients", &writes);
    assert_eq!(
        body,
        json!({
            "valueInputOption": "USER_ENTERED",
            "data": [
                {"range": "'Clients'!A9:C9", "majorDimension": "ROWS", "values": [["", "", ""]]},
                {"range": "'Clients'!B5:C5", "majorDimension": "ROWS", "values": [["Olena", true]]},
            ]
        })
    );
}

#[test]
fn block_body_spans_every_appended_row() {
    let block = RangeWrite::block(
        21,
        0,
        vec![vec![CellValue::text("a")], vec![CellValue::text("b")]],
    );
    let body = value_range_body("Clients", &block);
    assert_eq!(body["range"], json!("'Clients'!A21:A22"));
    assert_eq!(body["values"], json!([["a"], ["b"]]));
}

#[test]
fn append_dimension_request() {
    assert_eq!(
        append_rows_body(42, 103),
        json!({"requests": [{"appendDimension": {"sheetId": 42, "dimension": "ROWS", "length": 103}}]})
    );
}

// ---------------------------------------------------------------------------
// 3. Response parsing
// ---------------------------------------------------------------------------

#[test]
fn value_range_without_values_is_an_empty_sheet() {
    let rows = parse_value_range(r#"{"range":"'Clients'!A1:S1000","majorDimension":"ROWS"}"#)
        .expect("parse");
    assert!(rows.is_empty());
}

#[test]
fn ragged_rows_stay_ragged() {
    let rows = parse_value_range(
        r#"{"values":[["Date","Full name"],[45352,"Olena",380501234567,"",true]]}"#,
    )
    .expect("parse");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].len(), 2);
    assert_eq!(rows[1].get(2), &CellValue::Number(380501234567.0));
    assert_eq!(rows[1].get(4), &CellValue::Bool(true));
    assert_eq!(rows[1].get(10), &CellValue::Empty);
}

#[test]
fn sheet_properties_are_found_by_title() {
    let body = r#"{"sheets":[
        {"properties":{"sheetId":0,"title":"Archive","gridProperties":{"rowCount":50,"columnCount":5}}},
        {"properties":{"sheetId":812,"title":"Clients","gridProperties":{"rowCount":1000,"columnCount":26}}}
    ]}"#;
    let props = parse_sheet_properties(body, "Clients").expect("props");
    assert_eq!((props.sheet_id, props.row_count), (812, 1000));

    let missing = parse_sheet_properties(body, "Leads").unwrap_err();
    assert!(matches!(missing, SinkError::SheetNotFound(ref t) if t == "Leads"));
}

#[test]
fn api_error_message_prefers_structured_message() {
    let body = r#"{"error":{"code":400,"message":"Range exceeds grid limits","status":"INVALID_ARGUMENT"}}"#;
    assert_eq!(api_error_message(body), "Range exceeds grid limits");
    assert_eq!(api_error_message("<html>bad gateway</html>"), "<html>bad gateway</html>");
}
