use crate::error::{ReportError, Result};
use crate::table::{Column, Table};
use serde::Serialize;

/// Partition of a table's column names by type.
///
/// Computed once per loaded table; `numeric` is always a subset of `all` and
/// both keep the table's column order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnSet {
    pub numeric: Vec<String>,
    pub all: Vec<String>,
}

impl ColumnSet {
    pub fn is_numeric(&self, name: &str) -> bool {
        self.numeric.iter().any(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.all.iter().any(|n| n == name)
    }
}

/// A column is numeric when it has at least one value and every value parses as a number.
pub fn is_numeric_column(column: &Column) -> bool {
    let mut seen_value = false;
    for cell in &column.cells {
        if cell.is_missing() {
            continue;
        }
        if cell.as_number().is_none() {
            return false;
        }
        seen_value = true;
    }
    seen_value
}

/// Infer which columns of `table` are numeric.
///
/// # Errors
/// * [`ReportError::NoNumericColumns`] when no column qualifies
pub fn classify(table: &Table) -> Result<ColumnSet> {
    let numeric: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| is_numeric_column(c))
        .map(|c| c.name.clone())
        .collect();

    if numeric.is_empty() {
        return Err(ReportError::NoNumericColumns);
    }

    Ok(ColumnSet {
        numeric,
        all: table.column_names(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    fn table(headers: &[&str], rows: Vec<Vec<Cell>>) -> Table {
        Table::from_rows(headers.iter().map(|h| h.to_string()).collect(), rows).unwrap()
    }

    #[test]
    fn partitions_numeric_and_text() {
        let t = table(
            &["region", "sales", "units"],
            vec![
                vec![Cell::Text("N".into()), Cell::Number(100.0), Cell::Text("7".into())],
                vec![Cell::Text("S".into()), Cell::Empty, Cell::Number(3.0)],
            ],
        );
        let set = classify(&t).unwrap();
        assert_eq!(set.numeric, vec!["sales", "units"]);
        assert_eq!(set.all, vec!["region", "sales", "units"]);
        assert!(set.numeric.iter().all(|n| set.contains(n)));
    }

    #[test]
    fn fully_empty_column_is_not_numeric() {
        let t = table(
            &["blank", "value"],
            vec![vec![Cell::Empty, Cell::Number(1.0)]],
        );
        let set = classify(&t).unwrap();
        assert_eq!(set.numeric, vec!["value"]);
        assert!(!set.is_numeric("blank"));
    }

    #[test]
    fn text_only_table_has_no_numeric_columns() {
        let t = table(
            &["id", "name"],
            vec![vec![Cell::Text("a1".into()), Cell::Text("Ann".into())]],
        );
        assert!(matches!(classify(&t), Err(ReportError::NoNumericColumns)));
    }
}
