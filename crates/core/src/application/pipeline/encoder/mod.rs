// Per-format encoders
//
// Every encoder turns a table into bytes without mutating the input rows.

pub mod csv;
pub mod json;
pub mod xlsx;

use serde_json::Value;

use crate::domain::ExportFormat;
use crate::error::Result;
use crate::port::data_source::TableData;

pub use csv::CsvOptions;

/// Encode a table into the requested format
pub fn encode(
    format: ExportFormat,
    table: &TableData,
    sheet_name: &str,
    csv_options: &CsvOptions,
) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => csv::encode(table, csv_options),
        ExportFormat::Json => json::encode(table),
        ExportFormat::Xlsx => xlsx::encode(table, sheet_name),
    }
}

/// Render a cell the way flat-text formats expect it
pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
