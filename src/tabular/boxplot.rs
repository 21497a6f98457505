use super::stats::quantile_sorted;
use super::{CellValue, ParsedTable, TabularError};

/// Five-number summary plus IQR outliers. `min`/`max` are the column's
/// true extremes, not whisker-clamped; callers wanting whisker-only
/// display must exclude the outliers themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxplotSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub outliers: Vec<f64>,
}

pub fn boxplot(table: &ParsedTable, column: &str) -> Result<BoxplotSummary, TabularError> {
    let index = table
        .column_index(column)
        .ok_or_else(|| TabularError::ColumnNotFound(column.to_string()))?;

    let mut values = Vec::new();
    for cell in table.column(index) {
        match cell {
            CellValue::Missing => {}
            CellValue::Number(n) => values.push(*n),
            CellValue::Text(_) => return Err(TabularError::NotNumeric(column.to_string())),
        }
    }
    if values.is_empty() {
        return Err(TabularError::NotNumeric(column.to_string()));
    }

    let mut sorted = values.clone();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile_sorted(&sorted, 0.25);
    let median = quantile_sorted(&sorted, 0.5);
    let q3 = quantile_sorted(&sorted, 0.75);
    let iqr = q3 - q1;
    let lower_bound = q1 - 1.5 * iqr;
    let upper_bound = q3 + 1.5 * iqr;

    // Strictly outside the bounds; original order, duplicates kept.
    let outliers = values
        .iter()
        .copied()
        .filter(|v| *v < lower_bound || *v > upper_bound)
        .collect();

    Ok(BoxplotSummary {
        min: sorted[0],
        q1,
        median,
        q3,
        max: sorted[sorted.len() - 1],
        outliers,
    })
}
