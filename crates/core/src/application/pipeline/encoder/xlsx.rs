// XLSX encoder

use rust_xlsxwriter::{Color, Format, Workbook};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::port::data_source::TableData;

/// Hard limit the XLSX format imposes on sheet names
const SHEET_NAME_MAX: usize = 31;

/// Light fill behind the bold header row
const HEADER_FILL: Color = Color::RGB(0xDDEBF7);

pub fn encode(table: &TableData, sheet_name: &str) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet
        .set_name(sanitize_sheet_name(sheet_name))
        .map_err(xlsx_error)?;

    let header_format = Format::new().set_bold().set_background_color(HEADER_FILL);
    for (col, header) in table.headers.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, header, &header_format)
            .map_err(xlsx_error)?;
    }

    for (i, row) in table.rows.iter().enumerate() {
        let r = i as u32 + 1;
        for (j, cell) in row.iter().enumerate() {
            let c = j as u16;
            match cell {
                Value::Null => {}
                Value::Bool(b) => {
                    sheet.write_boolean(r, c, *b).map_err(xlsx_error)?;
                }
                Value::Number(n) => match n.as_f64() {
                    Some(f) => {
                        sheet.write_number(r, c, f).map_err(xlsx_error)?;
                    }
                    None => {
                        sheet.write_string(r, c, n.to_string()).map_err(xlsx_error)?;
                    }
                },
                Value::String(s) => {
                    sheet.write_string(r, c, s).map_err(xlsx_error)?;
                }
                other => {
                    sheet
                        .write_string(r, c, other.to_string())
                        .map_err(xlsx_error)?;
                }
            }
        }
    }

    sheet.set_freeze_panes(1, 0).map_err(xlsx_error)?;
    sheet.autofit();

    workbook.save_to_buffer().map_err(xlsx_error)
}

/// Replace characters the format forbids in sheet names and truncate to
/// the 31-character limit
pub(crate) fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') {
                '_'
            } else {
                c
            }
        })
        .take(SHEET_NAME_MAX)
        .collect();

    if cleaned.trim().is_empty() {
        "Export".to_string()
    } else {
        cleaned
    }
}

fn xlsx_error(err: rust_xlsxwriter::XlsxError) -> AppError {
    AppError::Internal(format!("xlsx encode: {}", err))
}
