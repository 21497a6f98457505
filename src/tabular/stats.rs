use super::{CellValue, ParsedTable, TabularError};
use std::collections::HashMap;

/// Frequency pairs reported for a categorical column.
const TOP_FREQUENCIES: usize = 10;

/// Quartiles need at least this many valid values to be meaningful.
const MIN_QUARTILE_SAMPLES: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub valid_count: usize,
    pub missing_count: usize,
    pub kind: SummaryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryKind {
    Numeric(NumericSummary),
    Categorical(CategoricalSummary),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericSummary {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (N-1 denominator); absent below two
    /// values, where it is undefined.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub max: f64,
    /// Absent when fewer than four valid values exist.
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub distinct_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalSummary {
    pub distinct_count: usize,
    /// Up to ten (value, count) pairs, most frequent first, first-seen
    /// order on ties.
    pub top_frequencies: Vec<(String, usize)>,
}

/// Summarize one column. Classification runs over the cell tags: a column
/// whose valid cells are all numbers is numeric, anything else non-empty
/// (text or mixed content) is categorical, and a column with no valid
/// cells at all is empty.
pub fn summarize(table: &ParsedTable, column: &str) -> Result<ColumnSummary, TabularError> {
    let index = table
        .column_index(column)
        .ok_or_else(|| TabularError::ColumnNotFound(column.to_string()))?;

    let valid: Vec<&CellValue> = table.column(index).filter(|c| !c.is_missing()).collect();
    let valid_count = valid.len();
    let missing_count = table.row_count() - valid_count;

    let kind = if valid.is_empty() {
        SummaryKind::Empty
    } else if let Some(numbers) = all_numbers(&valid) {
        SummaryKind::Numeric(numeric_summary(&numbers))
    } else {
        SummaryKind::Categorical(categorical_summary(&valid))
    };

    Ok(ColumnSummary {
        name: column.to_string(),
        valid_count,
        missing_count,
        kind,
    })
}

fn all_numbers(cells: &[&CellValue]) -> Option<Vec<f64>> {
    cells
        .iter()
        .map(|cell| match cell {
            CellValue::Number(n) => Some(*n),
            _ => None,
        })
        .collect()
}

fn numeric_summary(values: &[f64]) -> NumericSummary {
    let n = values.len();
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mean = values.iter().sum::<f64>() / n as f64;
    let std_dev = (n >= 2).then(|| {
        let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        (sum_sq / (n - 1) as f64).sqrt()
    });
    let (q1, q3) = if n >= MIN_QUARTILE_SAMPLES {
        (
            Some(quantile_sorted(&sorted, 0.25)),
            Some(quantile_sorted(&sorted, 0.75)),
        )
    } else {
        (None, None)
    };

    let mut distinct_count = 1;
    for pair in sorted.windows(2) {
        if pair[0] != pair[1] {
            distinct_count += 1;
        }
    }

    NumericSummary {
        mean,
        median: quantile_sorted(&sorted, 0.5),
        std_dev,
        min: sorted[0],
        max: sorted[n - 1],
        q1,
        q3,
        distinct_count,
    }
}

fn categorical_summary(cells: &[&CellValue]) -> CategoricalSummary {
    let mut first_seen: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for cell in cells {
        let key = cell.to_string();
        if !counts.contains_key(&key) {
            first_seen.push(key.clone());
        }
        *counts.entry(key).or_insert(0) += 1;
    }

    // Stable sort keeps first-seen order for equal counts.
    let mut top: Vec<(String, usize)> = first_seen
        .iter()
        .map(|value| (value.clone(), counts[value]))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1));
    top.truncate(TOP_FREQUENCIES);

    CategoricalSummary {
        distinct_count: first_seen.len(),
        top_frequencies: top,
    }
}

/// Quantile of sorted data via linear interpolation between order
/// statistics. Shared with the boxplot computation so the two consumers
/// can never disagree on quartiles.
///
/// - `q=0` returns min
/// - `q=1` returns max
/// - empty input returns `NaN`
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let q = q.clamp(0.0, 1.0);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let t = position - lower as f64;
    (1.0 - t) * sorted[lower] + t * sorted[upper]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_interpolates_between_order_statistics() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&sorted, 0.0), 1.0);
        assert_eq!(quantile_sorted(&sorted, 1.0), 4.0);
        assert_eq!(quantile_sorted(&sorted, 0.5), 2.5);
        assert_eq!(quantile_sorted(&sorted, 0.25), 1.75);
        assert_eq!(quantile_sorted(&sorted, 0.75), 3.25);
    }

    #[test]
    fn quantile_edge_inputs() {
        assert!(quantile_sorted(&[], 0.5).is_nan());
        assert_eq!(quantile_sorted(&[7.0], 0.25), 7.0);
    }

    #[test]
    fn sample_std_dev_uses_n_minus_one() {
        let summary = numeric_summary(&[25.0, 30.0]);
        assert!((summary.std_dev.unwrap() - 12.5f64.sqrt()).abs() < 1e-12);
        assert!(numeric_summary(&[25.0]).std_dev.is_none());
    }

    #[test]
    fn quartiles_absent_below_four_values() {
        let summary = numeric_summary(&[1.0, 2.0, 3.0]);
        assert!(summary.q1.is_none());
        assert!(summary.q3.is_none());
        let summary = numeric_summary(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(summary.q1, Some(1.75));
        assert_eq!(summary.q3, Some(3.25));
    }

    #[test]
    fn frequency_ties_keep_first_seen_order() {
        let b = CellValue::Text("b".into());
        let a = CellValue::Text("a".into());
        let c = CellValue::Text("c".into());
        let cells = vec![&b, &a, &c, &a, &b, &c];
        let summary = categorical_summary(&cells);
        assert_eq!(summary.distinct_count, 3);
        let values: Vec<&str> = summary
            .top_frequencies
            .iter()
            .map(|(v, _)| v.as_str())
            .collect();
        assert_eq!(values, ["b", "a", "c"]);
    }

    #[test]
    fn top_frequencies_are_capped_at_ten() {
        let owned: Vec<CellValue> = (0..15)
            .map(|i| CellValue::Text(format!("v{}", i)))
            .collect();
        let cells: Vec<&CellValue> = owned.iter().collect();
        let summary = categorical_summary(&cells);
        assert_eq!(summary.distinct_count, 15);
        assert_eq!(summary.top_frequencies.len(), 10);
    }
}
