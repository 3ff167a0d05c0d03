use crate::error::{ReportError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

lazy_static! {
    static ref NUMBER_REGEX: Regex =
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
}

/// Parses a decimal or scientific number literal, ignoring surrounding whitespace.
///
/// Words such as `inf` or `NaN` are not numbers here, even though `f64::from_str`
/// would accept them. Literals that overflow to infinity (`1e999`) stay text.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if !NUMBER_REGEX.is_match(trimmed) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Formats a number the way it appears in tables and chart labels.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// One value of a table.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    /// Numeric view of the cell; text that spells a number counts.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => parse_number(s),
            Cell::Empty => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(n) => f.write_str(&format_number(*n)),
            Cell::Text(s) => f.write_str(s),
            Cell::Empty => Ok(()),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cell::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Cell::Number(n) => serializer.serialize_str(&n.to_string()),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Empty => serializer.serialize_none(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn numbers(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.cells.iter().map(Cell::as_number)
    }
}

/// Rectangular in-memory dataset with uniquely named columns of equal length.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Builds a table from a header row and data rows.
    ///
    /// Short rows are padded with [`Cell::Empty`]. Header names are made unique
    /// (`name`, `name.1`, `name.2`, ...) and blank headers become `Unnamed: <i>`.
    /// A table without data rows is rejected with [`ReportError::EmptyInput`].
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        if rows.is_empty() || headers.is_empty() {
            return Err(ReportError::EmptyInput);
        }

        let width = headers.len();
        let names = dedupe_headers(headers);
        let mut columns: Vec<Column> = names
            .into_iter()
            .map(|name| Column {
                name,
                cells: Vec::with_capacity(rows.len()),
            })
            .collect();

        for (r, row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(ReportError::Load(format!(
                    "row {} has {} fields, expected {}",
                    r + 1,
                    row.len(),
                    width
                )));
            }
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.cells.push(cells.next().unwrap_or(Cell::Empty));
            }
        }

        let rows = columns[0].cells.len();
        Ok(Table { columns, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Cells of row `index`, in column order.
    pub fn row(&self, index: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.columns.iter().map(move |c| &c.cells[index])
    }

    /// Projects the table onto `names`, keeping the requested order.
    pub fn select(&self, names: &[String]) -> Result<Table> {
        if names.is_empty() {
            return Err(ReportError::InvalidSelection(
                "at least one column must be selected".to_string(),
            ));
        }
        let mut columns: Vec<Column> = Vec::with_capacity(names.len());
        for name in names {
            if columns.iter().any(|c| &c.name == name) {
                return Err(ReportError::InvalidSelection(format!(
                    "column '{}' is selected twice",
                    name
                )));
            }
            let column = self
                .column(name)
                .ok_or_else(|| ReportError::InvalidSelection(format!("unknown column '{}'", name)))?;
            columns.push(column.clone());
        }
        Ok(Table {
            columns,
            rows: self.rows,
        })
    }
}

fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(headers.len());

    for (i, header) in headers.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            header
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        seen.insert(name.clone());
        names.push(name);
    }

    names
}
