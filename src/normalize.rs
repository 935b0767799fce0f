use std::collections::HashMap;

use crate::coerce;
use crate::config::RosterSchema;
use crate::error::{EngineError, Result};
use crate::fields::Field;
use crate::models::StudentRow;

/// Spreadsheet cells projected onto the template columns, in template order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub cells: Vec<(Field, String)>,
}

impl NormalizedRow {
    pub fn coerce(&self) -> StudentRow {
        coerce::coerce_row(self.cells.iter().map(|(field, raw)| (*field, raw.as_str())))
    }
}

fn clean_header(raw: &str) -> &str {
    raw.trim_start_matches('\u{feff}').trim()
}

/// Reads a CSV export of the MIS sheet and projects it onto the template.
///
/// Extra columns are dropped. Any missing required column rejects the whole
/// file before a single row is produced.
pub fn normalize(bytes: &[u8], schema: &RosterSchema) -> Result<Vec<NormalizedRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| clean_header(h).is_empty()) {
        return Err(EngineError::UnreadableInput(
            "file has no header row".to_string(),
        ));
    }

    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (index, raw) in headers.iter().enumerate() {
        let label = schema.resolve_header(clean_header(raw));
        positions.entry(label).or_insert(index);
    }

    let missing: Vec<String> = schema
        .columns
        .iter()
        .filter(|(label, _)| !positions.contains_key(label.as_str()))
        .map(|(label, _)| label.clone())
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::SchemaMismatch { missing });
    }

    let projection: Vec<(Field, usize)> = schema
        .columns
        .iter()
        .filter_map(|(label, field)| positions.get(label.as_str()).map(|index| (*field, *index)))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let cells = projection
            .iter()
            .map(|(field, index)| (*field, record.get(*index).unwrap_or_default().to_string()))
            .collect();
        rows.push(NormalizedRow { cells });
    }

    Ok(rows)
}
