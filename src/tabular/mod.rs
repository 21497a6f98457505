pub mod boxplot;
pub mod parser;
pub mod schema;
pub mod stats;

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TabularError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File content could not be decoded as text")]
    Decode,

    #[error("File contains no data rows")]
    Empty,

    #[error("No delimiter produced a usable table")]
    Malformed,

    #[error("Spreadsheet support is not available: {0}")]
    MissingDependency(String),

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Column '{0}' is not numeric or has no values")]
    NotNumeric(String),
}

/// A single parsed cell. Downstream classification operates on the tag,
/// never by re-inspecting raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Missing,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    /// Interpret one delimited-text field. Empty after trimming is missing,
    /// a literal NaN counts as missing (pandas-style), anything that parses
    /// as f64 is a number, the rest is text.
    pub fn from_field(raw: &str) -> CellValue {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_nan() => CellValue::Missing,
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::Text(trimmed.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Missing => Ok(()),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// A rectangular table: ordered headers plus data rows of exactly the same
/// width. The constructor enforces the shape, so consumers can index rows
/// by a header position without bounds anxiety.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTable {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl ParsedTable {
    pub fn new(headers: Vec<String>, mut rows: Vec<Vec<CellValue>>) -> Self {
        let width = headers.len();
        for row in &mut rows {
            row.resize(width, CellValue::Missing);
        }
        Self { headers, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Number of data rows, header excluded.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &CellValue> {
        self.rows.iter().map(move |row| &row[index])
    }
}
