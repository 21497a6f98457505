use super::ParsedTable;
use serde::{Deserialize, Serialize};

/// Schema facts derived from a parsed table. The ingestion worker stores
/// these once; the statistics path re-derives them from the same bytes, so
/// the stored copy must always be reproducible by a fresh parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub headers: Vec<String>,
    pub row_count: usize,
    pub column_count: usize,
}

/// Pure function of the table: trimmed header names plus the two dimension
/// counts. Trimming is applied here as well as in the parser so every
/// caller sees identical names no matter which path produced the table.
pub fn extract(table: &ParsedTable) -> TableSchema {
    TableSchema {
        headers: table
            .headers()
            .iter()
            .map(|h| h.trim().to_string())
            .collect(),
        row_count: table.row_count(),
        column_count: table.column_count(),
    }
}
