use crate::normalize::RawValue;
use crate::normalize::Row;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::reference::index_to_reference;
use std::collections::BTreeMap;
use std::collections::HashMap;
use tracing::debug;

/// One worksheet as decoded from a workbook: sparse cells in reading order.
pub struct Sheet {
    /// Sheet name
    pub(crate) name: String,
    /// Whether serial dates count from 1904
    pub(crate) is_1904: bool,
    cells: Vec<Cell>,
    row_lower_bound: Option<usize>,
    row_upper_bound: Option<usize>,
    col_lower_bound: Option<usize>,
    col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(crate) fn new(name: &str, is_1904: bool) -> Self {
        Self {
            name: name.to_owned(),
            is_1904,
            cells: Vec::new(),
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the sheet holds no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Used range such as `A1:C10`, or `None` for an empty sheet.
    pub fn dimension(&self) -> Option<String> {
        let (row_lower, row_upper) = self.row_lower_bound.zip(self.row_upper_bound)?;
        let (col_lower, col_upper) = self.col_lower_bound.zip(self.col_upper_bound)?;
        Some(format!(
            "{}:{}",
            index_to_reference(row_lower, col_lower),
            index_to_reference(row_upper, col_upper)
        ))
    }

    /// Adds a cell, ignoring empty ones, and widens the used range.
    pub(crate) fn push(&mut self, cell: Cell) {
        if cell.kind == CellType::Empty {
            return;
        }
        self.update_bound(cell.row, cell.col);
        self.cells.push(cell);
    }

    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|row_lower_bound| row < row_lower_bound).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|row_upper_bound| row_upper_bound < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|col_lower_bound| col < col_lower_bound).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|col_upper_bound| col_upper_bound < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Pairs the header row with every later row.
    ///
    /// The header is the first row holding any value. A data cell under an
    /// absent header is skipped, and rows left with no fields are dropped.
    pub fn into_rows(self) -> Vec<Row> {
        let mut table: BTreeMap<usize, BTreeMap<usize, RawValue>> = BTreeMap::new();
        for cell in &self.cells {
            match cell.to_raw_value(self.is_1904) {
                Some(value) => {
                    // a repeated position keeps the later cell
                    table.entry(cell.row).or_default().insert(cell.col, value);
                }
                None => debug!(sheet = %self.name, cell = %cell, "skipping error cell"),
            }
        }

        let mut lines = table.into_values();
        let Some(header) = lines.next() else {
            return Vec::new();
        };
        let headers: HashMap<usize, String> = header
            .into_iter()
            .filter_map(|(col, value)| header_name(&value).map(|name| (col, name)))
            .collect();

        let mut skipped = 0usize;
        let rows: Vec<Row> = lines
            .filter_map(|line| {
                let row: Row = line
                    .into_iter()
                    .filter_map(|(col, value)| headers.get(&col).map(|name| (name.to_owned(), value)))
                    .collect();
                if row.is_empty() {
                    skipped += 1;
                    None
                } else {
                    Some(row)
                }
            })
            .collect();
        debug!(sheet = %self.name, rows = rows.len(), skipped, "paired rows with header");
        rows
    }
}

/// Text of a header cell; falsy values (empty text, zero, false) count as no header.
fn header_name(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Text(text) if !text.is_empty() => Some(text.to_owned()),
        RawValue::Number(number) if *number != 0.0 && !number.is_nan() => Some(number_to_string(*number)),
        RawValue::Bool(true) => Some("true".to_owned()),
        _ => None,
    }
}

/// Formats a number the way it reads as an object key in JavaScript.
fn number_to_string(number: f64) -> String {
    if number.is_infinite() {
        if number > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else {
        number.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(sheet: &mut Sheet, row: usize, col: usize, kind: CellType, value: &str) {
        sheet.push(Cell { row, col, kind, value: value.to_owned() });
    }

    #[test]
    fn pairs_rows_with_first_populated_row() {
        let mut sheet = Sheet::new("People", false);
        push(&mut sheet, 2, 0, CellType::Text, "name");
        push(&mut sheet, 2, 1, CellType::Text, "age");
        push(&mut sheet, 3, 0, CellType::Text, "Ann");
        push(&mut sheet, 3, 1, CellType::Number, "41");
        push(&mut sheet, 5, 1, CellType::Number, "7");
        assert_eq!(sheet.dimension().as_deref(), Some("A3:B6"));

        let rows = sheet.into_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].columns(), &["name", "age"]);
        assert_eq!(rows[0].get("age"), Some(&RawValue::Number(41.0)));
        assert_eq!(rows[1].columns(), &["age"]);
    }

    #[test]
    fn cells_without_header_are_skipped() {
        let mut sheet = Sheet::new("S", false);
        push(&mut sheet, 0, 0, CellType::Text, "name");
        push(&mut sheet, 0, 1, CellType::Text, "");
        push(&mut sheet, 1, 0, CellType::Text, "Ann");
        push(&mut sheet, 1, 1, CellType::Text, "dropped");
        push(&mut sheet, 1, 3, CellType::Text, "beyond");
        push(&mut sheet, 2, 2, CellType::Text, "orphan");

        let rows = sheet.into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns(), &["name"]);
    }

    #[test]
    fn error_cells_are_absent() {
        let mut sheet = Sheet::new("S", false);
        push(&mut sheet, 0, 0, CellType::Text, "a");
        push(&mut sheet, 0, 1, CellType::Text, "b");
        push(&mut sheet, 1, 0, CellType::Error, "#N/A");
        push(&mut sheet, 1, 1, CellType::Boolean, "1");
        push(&mut sheet, 2, 0, CellType::Error, "#REF!");

        let rows = sheet.into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns(), &["b"]);
    }

    #[test]
    fn numeric_and_boolean_headers() {
        let mut sheet = Sheet::new("S", false);
        push(&mut sheet, 0, 0, CellType::Number, "2024");
        push(&mut sheet, 0, 1, CellType::Number, "1.5");
        push(&mut sheet, 0, 2, CellType::Number, "0");
        push(&mut sheet, 0, 3, CellType::Boolean, "1");
        for col in 0..4 {
            push(&mut sheet, 1, col, CellType::Text, "x");
        }

        let rows = sheet.into_rows();
        assert_eq!(rows[0].columns(), &["2024", "1.5", "true"]);
    }

    #[test]
    fn header_only_sheet_has_no_rows() {
        let mut sheet = Sheet::new("S", false);
        push(&mut sheet, 0, 0, CellType::Text, "name");
        push(&mut sheet, 0, 1, CellType::Empty, "");
        assert!(!sheet.is_empty());
        assert!(sheet.into_rows().is_empty());
        let empty = Sheet::new("E", false);
        assert_eq!(empty.dimension(), None);
        assert!(empty.into_rows().is_empty());
    }
}
