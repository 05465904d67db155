//! # Tabular Decoders
//!
//! Turns file bytes into header-keyed [`Row`](crate::normalize::Row)s:
//!
//! - CSV text goes through [`csv::read_rows`] and yields one table.
//! - Excel workbooks (`.xlsx`, `.xlsm`, `.xls`) are opened with
//!   [`open_spreadsheet`], which sniffs the container format from the bytes,
//!   and yield one [`Sheet`] per worksheet.
//!
//! The file extension only decides between CSV, Excel and unsupported; an
//! `.xls` file that is really an Office Open XML package still opens.
pub mod cell;
pub mod csv;
pub(crate) mod excel;
pub mod reference;
pub mod sheet;
pub mod xls;
pub(crate) mod xlsx;

pub use sheet::Sheet;

use crate::error::SheetJsonError;
use crate::helpers::cfb::is_cfb;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised while recognizing or decoding a spreadsheet file.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    /// Neither CSV nor a recognized Excel extension
    #[error("Unsupported file type '{0}'")]
    UnsupportedFileType(String),

    #[error("Workbook '{0}' is password protected")]
    PasswordProtectedError(String),

    /// The workbook lists no worksheet at all
    #[error("Workbook '{0}' contains no worksheet")]
    EmptyWorkbookError(String),

    /// No worksheet yields a populated row
    #[error("No data found in '{0}'")]
    NoDataError(String),

    #[error("Missing part '{0}' in workbook")]
    MissingPartError(String),

    /// Bytes are neither a ZIP package nor an OLE compound file
    #[error("Unknown workbook format of '{0}'")]
    UnknownFormatError(String),
}

/// Input kinds recognized by file extension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
    Xlsm,
    Xls,
}

impl FileKind {
    /// Detects the kind from the file name's extension, ignoring case.
    pub fn detect(file_name: &str) -> Option<FileKind> {
        let extension = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(FileKind::Csv),
            "xlsx" => Some(FileKind::Xlsx),
            "xlsm" => Some(FileKind::Xlsm),
            "xls" => Some(FileKind::Xls),
            _ => None,
        }
    }

    pub fn is_excel(&self) -> bool {
        !matches!(self, FileKind::Csv)
    }
}

/// A decoded workbook: the parsing strategy for one Excel file.
pub trait Spreadsheet {
    /// File name the workbook was opened from.
    fn name(&self) -> &str;

    /// Worksheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Reads every worksheet, in workbook order.
    fn read_sheets(&mut self) -> Result<Vec<Sheet>, SheetJsonError>;
}

/// Opens an Excel workbook held in memory.
///
/// ZIP packages are read as Office Open XML, OLE compound files as BIFF
/// workbooks (or rejected as encrypted packages).
pub fn open_spreadsheet(file_name: &str, bytes: Vec<u8>) -> Result<Box<dyn Spreadsheet>, SheetJsonError> {
    if bytes.starts_with(b"PK") {
        debug!(file = file_name, "opening Office Open XML package");
        Ok(Box::new(XlsxSpreadsheet::open(file_name, bytes)?))
    } else if is_cfb(&bytes) {
        debug!(file = file_name, "opening compound file workbook");
        Ok(Box::new(XlsSpreadsheet::open(file_name, bytes)?))
    } else {
        Err(SpreadsheetError::UnknownFormatError(file_name.to_owned()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::xls::testing::label;
    use crate::spreadsheet::xls::testing::XlsBuilder;
    use crate::spreadsheet::xlsx::testing::XlsxBuilder;

    #[test]
    fn detects_kinds_by_extension() {
        assert_eq!(FileKind::detect("people.CSV"), Some(FileKind::Csv));
        assert_eq!(FileKind::detect("book.Xlsx"), Some(FileKind::Xlsx));
        assert_eq!(FileKind::detect("macro.xlsm"), Some(FileKind::Xlsm));
        assert_eq!(FileKind::detect("dir.v2/old.xls"), Some(FileKind::Xls));
        assert_eq!(FileKind::detect("notes.txt"), None);
        assert_eq!(FileKind::detect("csv"), None);
        assert!(FileKind::Xls.is_excel());
        assert!(!FileKind::Csv.is_excel());
    }

    #[test]
    fn sniffs_container_format() {
        let xlsx = XlsxBuilder::new().sheet("Data", r#"<row r="1"><c r="A1" t="inlineStr"><is><t>h</t></is></c></row>"#).build();
        // extension does not matter once the file is known to be Excel
        let spreadsheet = open_spreadsheet("renamed.xls", xlsx).unwrap();
        assert_eq!(spreadsheet.sheet_names(), vec!["Data"]);

        let xls = XlsBuilder::new().sheet("Legacy", &[label(0, 0, "h")]).build();
        let spreadsheet = open_spreadsheet("old.xls", xls).unwrap();
        assert_eq!(spreadsheet.name(), "old.xls");
        assert_eq!(spreadsheet.sheet_names(), vec!["Legacy"]);
    }

    #[test]
    fn rejects_unknown_bytes() {
        let error = open_spreadsheet("fake.xlsx", b"name,age\n".to_vec()).err().unwrap();
        assert!(matches!(
            error,
            SheetJsonError::SpreadsheetError(SpreadsheetError::UnknownFormatError(_))
        ));
    }
}
