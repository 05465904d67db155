use thiserror::Error;

/// Main error type for the converter.
/// Aggregates errors from the standard library, decoders and internal modules.
#[derive(Error, Debug)]
pub enum SheetJsonError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    CsvError(#[from] csv::Error),

    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlEscapeError(#[from] quick_xml::escape::EscapeError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    // Helper module errors
    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    Biff8HelperError(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),
}

/// The user-facing categories a conversion can fail with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Neither CSV nor a recognized Excel extension; nothing was parsed.
    UnsupportedFileType,
    /// The tokenizer or workbook decoder rejected the input.
    Parse,
    /// The workbook decoded fine but no sheet holds a populated row.
    EmptyResult,
    /// Building or rendering the records failed.
    Normalization,
}

impl SheetJsonError {
    pub fn kind(&self) -> FailureKind {
        use crate::spreadsheet::SpreadsheetError;
        match self {
            SheetJsonError::SpreadsheetError(SpreadsheetError::UnsupportedFileType(_)) => {
                FailureKind::UnsupportedFileType
            }
            SheetJsonError::SpreadsheetError(SpreadsheetError::EmptyWorkbookError(_))
            | SheetJsonError::SpreadsheetError(SpreadsheetError::NoDataError(_)) => FailureKind::EmptyResult,
            SheetJsonError::JsonError(_) => FailureKind::Normalization,
            _ => FailureKind::Parse,
        }
    }

    /// Message shown to whoever started the conversion.
    pub fn user_message(&self) -> String {
        match self.kind() {
            FailureKind::UnsupportedFileType => {
                "Please select a CSV or Excel file (.csv, .xlsx, .xls)".to_owned()
            }
            FailureKind::Parse => format!("Error parsing file: {self}"),
            FailureKind::EmptyResult => "No data found in the Excel file".to_owned(),
            FailureKind::Normalization => format!("Error processing data: {self}"),
        }
    }
}

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SheetJsonError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| SheetJsonError::WithContextError(format!("{}: {}", message, e)))
    }
}
