//! # sheet-json
//!
//! Converts tabular files into normalized JSON records.
//!
//! ## Features
//!
//! - **Multi-format input**: CSV text (`.csv`) and Excel workbooks (`.xlsx`,
//!   `.xlsm`, `.xls`), decoded in memory by pure Rust readers
//! - **Array reconstruction**: indexed columns such as `skills[0]`,
//!   `skills[1]` collapse into one `skills` array, ordered by index
//! - **Value cleanup**: strings are trimmed, empty values and `NaN` become
//!   null, comma-separated strings are split into arrays
//! - **Per-sheet output**: each worksheet is its own table; one selected
//!   sheet renders as a bare array, several as an object keyed by sheet name
//!
//! ## Example
//!
//! ```
//! use sheet_json::convert;
//!
//! let csv = b"name,skills[1],skills[0]\nJane,Go,SQL\n".to_vec();
//! let json = convert("talent.csv", csv)?.render()?;
//! assert!(json.contains("\"skills\": [\n      \"SQL\",\n      \"Go\"\n    ]"));
//! # Ok::<(), sheet_json::SheetJsonError>(())
//! ```
pub mod convert;
pub mod error;
mod helpers;
pub mod normalize;
pub mod session;
pub mod spreadsheet;

pub use convert::convert;
pub use convert::output_file_name;
pub use convert::render_records;
pub use convert::Conversion;
pub use convert::ExcelData;
pub use convert::SheetRecords;
pub use error::FailureKind;
pub use error::SheetJsonError;
pub use normalize::convert_table;
pub use normalize::RawValue;
pub use normalize::Record;
pub use normalize::Row;
pub use session::Session;
pub use session::Ticket;
pub use spreadsheet::open_spreadsheet;
pub use spreadsheet::FileKind;
pub use spreadsheet::Spreadsheet;
