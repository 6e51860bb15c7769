// CSV encoder

use crate::error::{AppError, Result};
use crate::port::data_source::TableData;

use super::cell_text;

/// UTF-8 byte order mark; some spreadsheet tools need it to detect encoding
const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub quote: u8,
    pub bom: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            bom: true,
        }
    }
}

pub fn encode(table: &TableData, options: &CsvOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if options.bom {
        out.extend_from_slice(BOM);
    }

    let mut writer = ::csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .from_writer(out);

    writer.write_record(&table.headers).map_err(csv_error)?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(cell_text))
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("csv flush: {}", e)))
}

fn csv_error(err: ::csv::Error) -> AppError {
    AppError::Internal(format!("csv encode: {}", err))
}
