use crate::error::ResultMessage;
use crate::error::ResultOptionChain;
use crate::error::SheetJsonError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel::resolve_number_formats;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use encoding_rs::UTF_16BE;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

// BIFF record type identifiers
const FORMULA: u16 = 6;        // Formula with its cached result
const EOF: u16 = 10;           // End of a substream
const DATE1904: u16 = 34;      // Date system flag (1904 vs 1900 base)
const FILE_PASS: u16 = 47;     // Encryption header
const CODE_PAGE: u16 = 66;     // Encoding of 8-bit strings
const BOUND_SHEET8: u16 = 133; // Sheet name, type and stream position
const MUL_RK: u16 = 189;       // Run of RK numbers in one row
const RSTRING: u16 = 214;      // BIFF5 rich text label
const XF: u16 = 224;           // Extended format: cell style to number format
const SST: u16 = 252;          // Shared string table
const LABEL_SST: u16 = 253;    // Label referencing the shared string table
const NUMBER: u16 = 515;       // IEEE double cell
const LABEL: u16 = 516;        // Inline text cell
const BOOL_ERR: u16 = 517;     // Boolean or error cell
const STRING: u16 = 519;       // Text result of the preceding formula
const ARRAY: u16 = 545;        // Array formula definition
const TABLE: u16 = 566;        // Data table definition
const RK: u16 = 638;           // Compressed number cell
const FORMAT: u16 = 1054;      // Custom number format
const SHR_FMLA: u16 = 1212;    // Shared formula definition
const BOF: u16 = 2057;         // Beginning of a substream

const BIFF8_VERSION: u16 = 0x0600;
const WORKSHEET_TYPE: u8 = 0;

/// Error types specific to XLS file parsing
#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Invalid Code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid Formula value '{0:#018x}'")]
    FormulaValueError(u64),

    #[error("Missing BOF record at stream position {0}")]
    SubstreamError(usize),
}

/// An Excel 97-2003 (BIFF8) or Excel 5.0/95 (BIFF5) workbook held in memory
pub(crate) struct XlsSpreadsheet {
    name: String,
    reader: Biff8Reader,
    is_1904: bool,
    shared_strings: Vec<String>,
    /// Cell type per XF index
    number_formats: Vec<CellType>,
    /// Worksheets as (name, stream position) pairs
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Parses the compound file and the workbook globals substream.
    pub(crate) fn open(file_name: &str, bytes: Vec<u8>) -> Result<XlsSpreadsheet, SheetJsonError> {
        let cfb = Cfb::parse(bytes)?;
        if cfb.exists("EncryptedPackage") {
            Err(SpreadsheetError::PasswordProtectedError(file_name.to_owned()))?
        }
        let mut reader = cfb
            .read("Workbook")
            .ok_none_else(|| cfb.read("Book"))?
            .map(Biff8Reader::new)
            .ok_or_else(|| SpreadsheetError::MissingPartError("Workbook".to_owned()))?;

        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<u32, CellType> = HashMap::new();
        let mut format_indexes: Vec<u32> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            BOF => reader.is_biff5 = reader.read_u16()? < BIFF8_VERSION,
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::PasswordProtectedError(file_name.to_owned()))?,
            DATE1904 => is_1904 = reader.read_u16()? == 1,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                match codepage::to_encoding(code_page) {
                    Some(encoding) if encoding != UTF_16LE && encoding != UTF_16BE => reader.encoding = encoding,
                    Some(_) => (),
                    None if reader.is_biff5 => Err(XlsError::CodePageError(code_page))?,
                    None => warn!(file = file_name, code_page, "ignoring unknown code page"),
                }
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = if reader.is_biff5 {
                    reader.read_short_xl_unicode_string()?
                } else {
                    reader.read_xl_unicode_string()?
                };
                custom_formats.insert(id as u32, CellType::parse_custom_number_format(&format));
            }
            XF => {
                reader.skip(2)?;
                format_indexes.push(reader.read_u16()? as u32);
            }
            SST => shared_strings = load_shared_strings(&mut reader).with_prefix("SST")?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                let _visibility = reader.read_u8()?;
                let sheet_type = reader.read_u8()?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                if sheet_type == WORKSHEET_TYPE {
                    sheets.push((sheet_name, pointer));
                } else {
                    debug!(file = file_name, sheet = %sheet_name, sheet_type, "skipping non-worksheet");
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::EmptyWorkbookError(file_name.to_owned()))?
        }
        debug!(
            file = file_name,
            sheets = sheets.len(),
            shared_strings = shared_strings.len(),
            is_1904,
            is_biff5 = reader.is_biff5,
            "opened xls workbook"
        );

        let number_formats = resolve_number_formats(&format_indexes, &custom_formats);
        Ok(XlsSpreadsheet {
            name: file_name.to_owned(),
            reader,
            is_1904,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    fn read_sheet(&mut self, sheet_name: &str, pointer: usize) -> Result<Sheet, SheetJsonError> {
        let mut sheet = Sheet::new(sheet_name, self.is_1904);
        self.reader.goto(pointer);
        if self.reader.next()? != Some(BOF) {
            Err(XlsError::SubstreamError(pointer))?
        }

        // embedded chart substreams nest their own BOF/EOF pairs
        let mut depth = 0usize;
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF => depth += 1,
                EOF if depth == 0 => break,
                EOF => depth -= 1,
                _ if depth > 0 => (),
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let first_col = self.reader.read_u16()? as usize;
                    let count = self.reader.record_len().saturating_sub(6) / 6;
                    for col in first_col..first_col + count {
                        let index = self.reader.read_u16()? as usize;
                        let value = self.reader.read_rk_number()?;
                        let kind = self.number_format(index);
                        sheet.push(Cell { row, col, kind, value: value.to_string() });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | RSTRING | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let index = self.reader.read_u16()? as usize;
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => (Either::Right(index), self.reader.read_f64()?.to_string()),
                        RK => (Either::Right(index), self.reader.read_rk_number()?.to_string()),
                        LABEL_SST => read_label_sst_cell(&mut self.reader, &self.shared_strings)?,
                        LABEL | RSTRING => (Either::Left(CellType::Text), self.reader.read_xl_unicode_string()?),
                        _ => read_formula_cell(&mut self.reader, index)?,
                    };
                    let kind = match either {
                        Either::Left(kind) => kind,
                        Either::Right(index) => self.number_format(index),
                    };
                    if !value.is_empty() {
                        sheet.push(Cell { row, col, kind, value });
                    }
                }
                _ => (),
            }
        }
        Ok(sheet)
    }

    fn number_format(&self, index: usize) -> CellType {
        self.number_formats.get(index).copied().unwrap_or(CellType::Number)
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn read_sheets(&mut self) -> Result<Vec<Sheet>, SheetJsonError> {
        let mut sheets = Vec::with_capacity(self.sheets.len());
        for (sheet_name, pointer) in self.sheets.clone() {
            let sheet = self.read_sheet(&sheet_name, pointer).with_prefix(&sheet_name)?;
            debug!(sheet = %sheet_name, dimension = ?sheet.dimension(), "read worksheet");
            sheets.push(sheet);
        }
        Ok(sheets)
    }
}

/// Loads the shared string table of the SST record and its continuations.
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, SheetJsonError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings: Vec<String> = Vec::with_capacity(count.min(65_536));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

/// Reads the body of a BOOLERR record: a boolean or an error code.
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetJsonError> {
    let value = reader.read_u8()?;
    let is_error = reader.read_u8()? != 0;
    Ok(if is_error {
        (Either::Left(CellType::Error), to_error_value(value).to_owned())
    } else {
        (Either::Left(CellType::Boolean), value.to_string())
    })
}

/// Resolves a LABELSST cell against the shared string table.
fn read_label_sst_cell(
    reader: &mut Biff8Reader,
    shared_strings: &[String],
) -> Result<(Either<CellType, usize>, String), SheetJsonError> {
    let index = reader.read_usize()?;
    let value = match shared_strings.get(index) {
        Some(value) => value.to_owned(),
        None => {
            warn!(index, "shared string index out of range");
            String::new()
        }
    };
    Ok((Either::Left(CellType::Text), value))
}

/// Reads the cached result of a FORMULA record.
///
/// A text result lives in the STRING record that follows, possibly after
/// ARRAY, SHRFMLA or TABLE records.
fn read_formula_cell(reader: &mut Biff8Reader, index: usize) -> Result<(Either<CellType, usize>, String), SheetJsonError> {
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF_0000_0000_0000) != 0xFFFF_0000_0000_0000;
    if is_number {
        return Ok((Either::Right(index), f64::from_bits(formula).to_string()));
    }
    match formula & 0xFF {
        0 => loop {
            let position = reader.position();
            match reader.next()? {
                Some(STRING) => return Ok((Either::Left(CellType::Text), reader.read_xl_unicode_string()?)),
                Some(ARRAY) | Some(SHR_FMLA) | Some(TABLE) => continue,
                _ => {
                    reader.goto(position);
                    return Ok((Either::Left(CellType::Text), String::new()));
                }
            }
        },
        1 => {
            let value = if (formula >> 16) & 0xFF > 0 { "1" } else { "0" };
            Ok((Either::Left(CellType::Boolean), value.to_owned()))
        }
        2 => {
            let code = ((formula >> 16) & 0xFF) as u8;
            Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
        }
        3 => Ok((Either::Left(CellType::Text), String::new())),
        _ => Err(XlsError::FormulaValueError(formula).into()),
    }
}
