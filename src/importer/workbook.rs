use super::Table;
use crate::error::{BudgeryError, Result};

/// Worksheet holding the statement lines in an Amex workbook export.
pub const TRANSACTIONS_SHEET: &str = "Transaction Details";
/// Title and account metadata rows above the header.
pub const LEADING_ROWS: usize = 6;

#[cfg(feature = "xlsx")]
pub fn extract(content: &[u8]) -> Result<Table> {
    use calamine::Reader;
    use std::io::Cursor;

    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| BudgeryError::UnsupportedFormat(format!("unreadable workbook: {e}")))?;
    if !workbook.sheet_names().iter().any(|name| name == TRANSACTIONS_SHEET) {
        tracing::debug!(sheets = ?workbook.sheet_names(), "no transactions sheet");
        return Err(BudgeryError::UnrecognizedSchema(Vec::new()));
    }
    let range = workbook
        .worksheet_range(TRANSACTIONS_SHEET)
        .map_err(|e| BudgeryError::UnsupportedFormat(format!("unreadable worksheet: {e}")))?;

    // The range begins at the first used cell, not necessarily at row 1.
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let skip = LEADING_ROWS
        .checked_sub(first_row)
        .ok_or_else(|| BudgeryError::UnrecognizedSchema(Vec::new()))?;

    let mut rows = range.rows().skip(skip);
    let Some(header_cells) = rows.next() else {
        return Err(BudgeryError::UnrecognizedSchema(Vec::new()));
    };
    let mut headers: Vec<String> = header_cells.iter().map(cell_text).collect();
    while headers.last().is_some_and(|h| h.trim().is_empty()) {
        headers.pop();
    }

    let width = headers.len();
    let mut table = Table::new(headers);
    for cells in rows {
        let mut values: Vec<String> = cells.iter().map(cell_text).collect();
        // Cells right of the header are padding unless something was typed there.
        if values[width.min(values.len())..].iter().all(|v| v.is_empty()) {
            values.truncate(width);
        }
        table.push(values);
    }
    Ok(table)
}

#[cfg(not(feature = "xlsx"))]
pub fn extract(_content: &[u8]) -> Result<Table> {
    Err(BudgeryError::UnsupportedFormat(
        "spreadsheet support is not enabled in this build".into(),
    ))
}

#[cfg(feature = "xlsx")]
fn cell_text(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_mdy(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        _ => String::new(),
    }
}

/// Excel serials count days from 1899-12-30 (that epoch absorbs the 1900 leap-year bug).
pub fn excel_serial_to_mdy(serial: f64) -> String {
    chrono::NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|base| base.checked_add_signed(chrono::Duration::days(serial.floor() as i64)))
        .map(|date| date.format("%m/%d/%Y").to_string())
        .unwrap_or_default()
}
