use crate::error::{ReportError, Result};
use crate::table::{Cell, Table, format_number, parse_number};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use log::debug;
use std::io::Cursor;
use std::path::Path;

/// Field spellings that mean "no value".
const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Load an uploaded file into a [`Table`]
///
/// The file extension decides the parser: `.csv` is read as comma-separated
/// text, anything else as a workbook whose first sheet is used. The first row
/// holds the column names.
///
/// # Arguments
/// * `bytes` - Raw file content
/// * `filename` - Original file name; only its extension is inspected
///
/// # Errors
/// * [`ReportError::EmptyInput`] if the file has no data rows
/// * [`ReportError::Load`] if the content cannot be parsed, carrying the cause
///
/// # Examples
/// ```
/// use gridtodash::loader::load;
///
/// let table = load(b"region,sales\nN,100\nS,300\n", "sales.csv").unwrap();
/// assert_eq!(table.row_count(), 2);
/// ```
pub fn load(bytes: &[u8], filename: &str) -> Result<Table> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    debug!("loading {} ({} bytes)", filename, bytes.len());

    match extension.as_deref() {
        Some("csv") => from_csv(bytes),
        _ => from_workbook(bytes),
    }
}

/// Read a file from disk and [`load`] it.
pub fn load_path(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| ReportError::Load(format!("{}: {}", path.display(), e)))?;
    load(&bytes, &path.to_string_lossy())
}

fn from_csv(bytes: &[u8]) -> Result<Table> {
    let data = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ReportError::Load(e.to_string()))?;
        // Skip blank lines; a line of bare delimiters is a row of missing values
        if record.len() == 1 && record[0].trim().is_empty() {
            continue;
        }
        records.push(record);
    }

    let mut records = records.into_iter();
    let headers: Vec<String> = match records.next() {
        Some(header) => header.iter().map(|h| h.to_string()).collect(),
        None => return Err(ReportError::EmptyInput),
    };

    let rows: Vec<Vec<Cell>> = records
        .map(|record| record.iter().map(csv_cell).collect())
        .collect();

    if rows.is_empty() {
        return Err(ReportError::EmptyInput);
    }

    Table::from_rows(headers, rows)
}

fn csv_cell(field: &str) -> Cell {
    if is_missing(field) {
        Cell::Empty
    } else if let Some(n) = parse_number(field) {
        Cell::Number(n)
    } else {
        Cell::Text(field.to_string())
    }
}

fn is_missing(field: &str) -> bool {
    MISSING_MARKERS.contains(&field.trim())
}

fn from_workbook(bytes: &[u8]) -> Result<Table> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| ReportError::Load(e.to_string()))?;

    // Get the first worksheet
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ReportError::Load("no sheets found in workbook".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ReportError::Load(format!("sheet '{}': {}", sheet_name, e)))?;

    let mut row_iter = range.rows();
    let headers: Vec<String> = match row_iter.next() {
        Some(header) => header.iter().map(header_text).collect(),
        None => return Err(ReportError::EmptyInput),
    };

    let mut rows = Vec::new();
    for row in row_iter {
        let cells: Vec<Cell> = row.iter().map(workbook_cell).collect();
        // Skip completely empty rows
        if cells.iter().all(Cell::is_missing) {
            continue;
        }
        rows.push(cells);
    }

    debug!("sheet '{}': {} data rows", sheet_name, rows.len());

    if rows.is_empty() {
        return Err(ReportError::EmptyInput);
    }

    Table::from_rows(headers, rows)
}

fn workbook_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) if f.is_finite() => Cell::Number(*f),
        Data::Float(f) => Cell::Text(f.to_string()),
        Data::String(s) if is_missing(s) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Text(if *b { "True" } else { "False" }.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) => Cell::Text(value.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Cell::Number(dt.as_f64()),
        },
        other => Cell::Text(other.to_string()),
    }
}

fn header_text(cell: &Data) -> String {
    match workbook_cell(cell) {
        Cell::Number(n) => format_number(n),
        Cell::Text(s) => s,
        Cell::Empty => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn xlsx_bytes(build: impl FnOnce(&mut rust_xlsxwriter::Worksheet)) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        build(worksheet);
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn csv_with_numbers_and_text() {
        let table = load(b"region,sales\nN,100\nS,300\nE,200\n", "data.csv").unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column_names(), vec!["region", "sales"]);
        let sales = table.column("sales").unwrap();
        assert_eq!(sales.cells[1], Cell::Number(300.0));
        assert_eq!(table.column("region").unwrap().cells[0], Cell::Text("N".into()));
    }

    #[test]
    fn extension_is_case_insensitive() {
        let table = load(b"a\n1\n", "DATA.CSV").unwrap();
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn zero_byte_csv_is_empty_input() {
        let err = load(b"", "empty.csv").unwrap_err();
        assert!(matches!(err, ReportError::EmptyInput));
    }

    #[test]
    fn header_only_csv_is_empty_input() {
        let err = load(b"region,sales\n", "header.csv").unwrap_err();
        assert!(matches!(err, ReportError::EmptyInput));
    }

    #[test]
    fn missing_markers_and_blank_lines() {
        let table = load(b"\xEF\xBB\xBFa,b\n1,NA\n\n,x\n", "gaps.csv").unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("b").unwrap().cells[0], Cell::Empty);
        assert_eq!(table.column("a").unwrap().cells[1], Cell::Empty);
    }

    #[test]
    fn delimiter_only_lines_are_missing_rows() {
        let table = load(b"a,b\n1,2\n,\n \n3,4\n", "holes.csv").unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column("a").unwrap().cells[1], Cell::Empty);
        assert_eq!(table.column("b").unwrap().cells[1], Cell::Empty);
        assert_eq!(table.column("a").unwrap().cells[2], Cell::Number(3.0));
    }

    #[test]
    fn overflowing_number_stays_text() {
        let table = load(b"region,sales\nN,1e999\nS,300\n", "huge.csv").unwrap();
        let sales = table.column("sales").unwrap();
        assert_eq!(sales.cells[0], Cell::Text("1e999".into()));
        assert!(!crate::columns::is_numeric_column(sales));
        assert!(matches!(
            crate::metrics::compute(&table, "sales"),
            Err(ReportError::InvalidSelection(_))
        ));
    }

    #[test]
    fn invalid_utf8_reports_cause() {
        let err = load(b"name\n\xff\xfe\n", "bad.csv").unwrap_err();
        match err {
            ReportError::Load(msg) => assert!(msg.to_lowercase().contains("utf-8"), "{}", msg),
            other => panic!("expected load error, got {:?}", other),
        }
    }

    #[test]
    fn ragged_csv_is_load_error() {
        let err = load(b"a,b\n1,2,3\n", "ragged.csv").unwrap_err();
        assert!(matches!(err, ReportError::Load(_)));
    }

    #[test]
    fn xlsx_first_sheet_is_loaded() {
        let bytes = xlsx_bytes(|sheet| {
            sheet.write_string(0, 0, "region").unwrap();
            sheet.write_string(0, 1, "sales").unwrap();
            sheet.write_string(1, 0, "N").unwrap();
            sheet.write_number(1, 1, 100.0).unwrap();
            sheet.write_string(2, 0, "S").unwrap();
            sheet.write_number(2, 1, 300.5).unwrap();
        });

        let table = load(&bytes, "report.xlsx").unwrap();
        assert_eq!(table.column_names(), vec!["region", "sales"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("sales").unwrap().cells[1], Cell::Number(300.5));
    }

    #[test]
    fn xlsx_header_only_is_empty_input() {
        let bytes = xlsx_bytes(|sheet| {
            sheet.write_string(0, 0, "region").unwrap();
        });
        let err = load(&bytes, "header.xlsx").unwrap_err();
        assert!(matches!(err, ReportError::EmptyInput));
    }

    #[test]
    fn corrupt_workbook_is_load_error() {
        let err = load(b"definitely not a zip archive", "broken.xlsx").unwrap_err();
        assert!(matches!(err, ReportError::Load(_)));
    }

    #[test]
    fn load_path_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        std::fs::write(&path, "id,amount\n1,2.5\n").unwrap();
        let table = load_path(&path).unwrap();
        assert_eq!(table.column("amount").unwrap().cells[0], Cell::Number(2.5));
    }
}
