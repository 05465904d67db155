//! # Conversion
//!
//! Entry point from file bytes to a JSON document. CSV input becomes one
//! record list; Excel input becomes [`ExcelData`], one record list per
//! worksheet that yields at least one record, rendered according to the
//! selected sheets.
use crate::error::SheetJsonError;
use crate::normalize::convert_table;
use crate::normalize::Record;
use crate::spreadsheet::csv::read_rows;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::FileKind;
use crate::spreadsheet::Sheet;
use crate::spreadsheet::SpreadsheetError;
use serde_json::Map;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;
use tracing::info;

/// Extensions replaced by `.json` in derived file names.
const OUTPUT_STRIPPED_EXTENSIONS: [&str; 3] = [".csv", ".xlsx", ".xls"];

/// The normalized records of one worksheet.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetRecords {
    pub name: String,
    pub records: Vec<Record>,
}

/// Normalized records of every worksheet that yields at least one record,
/// in workbook order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExcelData {
    pub sheets: Vec<SheetRecords>,
    pub total_records: usize,
}

impl ExcelData {
    /// Normalizes each sheet as its own table and drops sheets without records.
    pub fn from_sheets(sheets: Vec<Sheet>) -> ExcelData {
        let mut data = ExcelData::default();
        for sheet in sheets {
            let name = sheet.name().to_owned();
            let records = convert_table(&sheet.into_rows());
            if records.is_empty() {
                debug!(sheet = %name, "dropping sheet without records");
                continue;
            }
            data.total_records += records.len();
            data.sheets.push(SheetRecords { name, records });
        }
        data
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.sheets.iter().map(|sheet| sheet.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&SheetRecords> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    /// JSON value for the selected sheets: the bare record list when exactly
    /// one is selected, otherwise an object keyed by sheet name.
    pub fn to_value(&self, selected: &HashSet<String>) -> Value {
        let mut chosen = self.sheets.iter().filter(|sheet| selected.contains(&sheet.name)).peekable();
        let Some(first) = chosen.next() else {
            return Value::Array(Vec::new());
        };
        if chosen.peek().is_none() {
            return records_value(&first.records);
        }
        let mut object = Map::new();
        for sheet in std::iter::once(first).chain(chosen) {
            object.insert(sheet.name.clone(), records_value(&sheet.records));
        }
        Value::Object(object)
    }

    /// Pretty-printed JSON for the selected sheets.
    pub fn render(&self, selected: &HashSet<String>) -> Result<String, SheetJsonError> {
        Ok(serde_json::to_string_pretty(&self.to_value(selected))?)
    }

    /// Pretty-printed JSON with every sheet selected.
    pub fn render_all(&self) -> Result<String, SheetJsonError> {
        let selected = self.sheet_names().map(str::to_owned).collect();
        self.render(&selected)
    }
}

/// Result of converting one file.
#[derive(Clone, Debug, PartialEq)]
pub enum Conversion {
    /// CSV input: one table
    Table(Vec<Record>),
    /// Excel input: one table per surviving worksheet
    Workbook(ExcelData),
}

impl Conversion {
    /// Renders the whole conversion, every sheet selected.
    pub fn render(&self) -> Result<String, SheetJsonError> {
        match self {
            Conversion::Table(records) => render_records(records),
            Conversion::Workbook(data) => data.render_all(),
        }
    }
}

/// Converts the bytes of `file_name` into normalized records.
///
/// The extension decides between CSV and Excel input. A workbook where no
/// sheet yields a record is an error, an empty CSV is not.
pub fn convert(file_name: &str, bytes: Vec<u8>) -> Result<Conversion, SheetJsonError> {
    let kind = FileKind::detect(file_name)
        .ok_or_else(|| SpreadsheetError::UnsupportedFileType(file_name.to_owned()))?;
    if !kind.is_excel() {
        let records = convert_table(&read_rows(file_name, &bytes)?);
        info!(file = file_name, records = records.len(), "converted csv");
        return Ok(Conversion::Table(records));
    }

    let mut spreadsheet = open_spreadsheet(file_name, bytes)?;
    let data = ExcelData::from_sheets(spreadsheet.read_sheets()?);
    if data.is_empty() {
        Err(SpreadsheetError::NoDataError(file_name.to_owned()))?
    }
    info!(
        file = file_name,
        kind = ?kind,
        sheets = data.sheets.len(),
        records = data.total_records,
        "converted workbook"
    );
    Ok(Conversion::Workbook(data))
}

/// Pretty-prints one record list as a JSON array.
pub fn render_records(records: &[Record]) -> Result<String, SheetJsonError> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Derives the JSON file name: one trailing `.csv`, `.xlsx` or `.xls`
/// (any case) is replaced by `.json`.
pub fn output_file_name(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    let stem = OUTPUT_STRIPPED_EXTENSIONS
        .iter()
        .find(|extension| lower.ends_with(*extension))
        .map(|extension| &file_name[..file_name.len() - extension.len()])
        .unwrap_or(file_name);
    format!("{stem}.json")
}

fn records_value(records: &[Record]) -> Value {
    Value::Array(records.iter().cloned().map(Value::Object).collect())
}
