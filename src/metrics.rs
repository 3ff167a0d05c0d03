use crate::error::{ReportError, Result};
use crate::table::Table;
use serde::Serialize;

/// Summary of one numeric column.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsResult {
    /// Every row of the table, whether or not this column has a value in it
    pub row_count: usize,
    /// Sum of the values present
    pub total: f64,
    /// Mean of the values present; `None` when the column has no values at all
    pub average: Option<f64>,
    pub source_column: String,
}

/// Compute row count, sum and mean of `column`.
///
/// Missing entries are skipped, not counted as zero.
///
/// # Errors
/// * [`ReportError::InvalidSelection`] if `column` is unknown or holds text
pub fn compute(table: &Table, column: &str) -> Result<MetricsResult> {
    let col = table
        .column(column)
        .ok_or_else(|| ReportError::InvalidSelection(format!("unknown column '{}'", column)))?;

    if col.cells.iter().any(|c| !c.is_missing() && c.as_number().is_none()) {
        return Err(ReportError::InvalidSelection(format!(
            "column '{}' is not numeric",
            column
        )));
    }

    let (total, present) = col
        .numbers()
        .flatten()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));

    let average = if present == 0 {
        None
    } else {
        Some(total / present as f64)
    };

    Ok(MetricsResult {
        row_count: table.row_count(),
        total,
        average,
        source_column: column.to_string(),
    })
}
