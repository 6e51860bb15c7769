// Combined-export merge
//
// Aligns rows from entities with divergent field schemas on one shared,
// label-keyed header list.

use serde_json::Value;

use crate::port::data_source::TableData;

/// Leading synthetic column carrying each row's entity display name
pub const SOURCE_COLUMN: &str = "Source";

/// One entity's contribution to a combined export
#[derive(Debug, Clone)]
pub struct CombinedInput {
    /// Entity display name written into the source column
    pub source_name: String,
    /// Labels from the entity's field list (pass 1)
    pub field_labels: Vec<String>,
    /// The entity's extracted rows, headers keyed by label (pass 2)
    pub table: TableData,
}

/// Two-pass merge.
///
/// Pass 1 unions the field labels of every entity into a single ordered
/// header list seeded with [`SOURCE_COLUMN`]; a label already present is
/// not duplicated, so two entities sharing a field label share a column.
///
/// Pass 2 builds each output row at the combined width, placing every
/// cell at the index of its own header label and leaving unmatched
/// positions blank. Rows from schema-divergent entities therefore align
/// on shared columns and can never land in a column belonging to an
/// unrelated field.
pub fn merge(inputs: &[CombinedInput]) -> TableData {
    let mut headers = vec![SOURCE_COLUMN.to_string()];
    for input in inputs {
        for label in &input.field_labels {
            if !headers.iter().any(|h| h == label) {
                headers.push(label.clone());
            }
        }
    }

    let mut rows = Vec::new();
    for input in inputs {
        // Resolve the entity's own header positions against the combined
        // list once per entity, not once per row
        let positions: Vec<Option<usize>> = input
            .table
            .headers
            .iter()
            .map(|label| headers.iter().position(|h| h == label))
            .collect();

        for source_row in &input.table.rows {
            let mut row = vec![Value::Null; headers.len()];
            row[0] = Value::String(input.source_name.clone());
            for (i, cell) in source_row.iter().enumerate() {
                if let Some(Some(index)) = positions.get(i) {
                    row[*index] = cell.clone();
                }
            }
            rows.push(row);
        }
    }

    TableData { headers, rows }
}
