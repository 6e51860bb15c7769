// JSON encoder

use serde_json::{Map, Value};

use crate::error::Result;
use crate::port::data_source::TableData;

/// Array of objects, one per row, keyed by header label. Pretty-printed
/// UTF-8; serde_json leaves non-ASCII characters unescaped.
pub fn encode(table: &TableData) -> Result<Vec<u8>> {
    let objects: Vec<Map<String, Value>> = table
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (i, header) in table.headers.iter().enumerate() {
                object.insert(
                    header.clone(),
                    row.get(i).cloned().unwrap_or(Value::Null),
                );
            }
            object
        })
        .collect();

    Ok(serde_json::to_vec_pretty(&objects)?)
}
