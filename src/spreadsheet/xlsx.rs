use crate::error::ResultMessage;
use crate::error::SheetJsonError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::io::Cursor;
use tracing::debug;
use tracing::warn;
use zip::ZipArchive;

// XML tag names (local names) for parsing XLSX parts
const TAG_SHARED_STRING_ITEM: &[u8] = b"si"; // Shared string table item
const TAG_WORKBOOK_PROPERTIES: &[u8] = b"workbookPr";
const TAG_SHEET: &[u8] = b"sheet"; // Worksheet entry in workbook.xml
const TAG_ROW: &[u8] = b"row";
const TAG_CELL: &[u8] = b"c";
const TAG_INLINE_STRING: &[u8] = b"is";
const TAG_VALUE: &[u8] = b"v";

/// An Excel 2007+ workbook (.xlsx, .xlsm) held in memory
pub(crate) struct XlsxSpreadsheet {
    name: String,
    zip: ZipArchive<Cursor<Vec<u8>>>,
    is_1904: bool,
    /// Cell type per style index of `cellXfs`
    number_formats: Vec<CellType>,
    shared_strings: Vec<String>,
    /// Worksheets as (name, part path) pairs in workbook order
    sheets: Vec<(String, String)>,
}

impl XlsxSpreadsheet {
    /// Opens the archive and loads the workbook structure, styles and shared strings.
    pub(crate) fn open(file_name: &str, bytes: Vec<u8>) -> Result<XlsxSpreadsheet, SheetJsonError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::EmptyWorkbookError(file_name.to_owned()))?
        }
        let number_formats = excel::load_number_formats(&mut zip).with_prefix("xl/styles.xml")?;
        let shared_strings = load_shared_strings(&mut zip).with_prefix("xl/sharedStrings.xml")?;
        debug!(
            file = file_name,
            sheets = sheets.len(),
            shared_strings = shared_strings.len(),
            is_1904,
            "opened xlsx workbook"
        );

        Ok(XlsxSpreadsheet {
            name: file_name.to_owned(),
            zip,
            is_1904,
            number_formats,
            shared_strings,
            sheets,
        })
    }

    fn read_sheet(&mut self, sheet_name: &str, zip_path: &str) -> Result<Sheet, SheetJsonError> {
        let mut sheet = Sheet::new(sheet_name, self.is_1904);
        let mut reader = self
            .zip
            .xml_reader(zip_path)?
            .ok_or_else(|| SpreadsheetError::MissingPartError(zip_path.to_owned()))?;
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut is_shared = false;
        let mut value = String::new();
        match_xml_events!(reader => {
            Event::Start(event) if event.local_name().as_ref() == TAG_ROW => {
                if let Some(index) = event.parse_attribute_value::<usize>("r")?.filter(|index| *index > 0) {
                    row_count = index - 1;
                }
                col_count = 0;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_ROW => {
                row_count += 1;
                col_count = 0;
            }
            Event::Start(event) if event.local_name().as_ref() == TAG_CELL => {
                (row, col) = event
                    .get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count = col + 1;
                value.clear();
                let cell_type = event.get_attribute_value("t")?;
                is_shared = cell_type.as_deref() == Some("s");
                kind = match cell_type.as_deref() {
                    Some("s") | Some("inlineStr") | Some("str") => CellType::Text,
                    Some("d") => CellType::IsoDateTime,
                    Some("b") => CellType::Boolean,
                    Some("e") => CellType::Error,
                    _ => CellType::Number,
                };
                if kind == CellType::Number {
                    if let Some(index) = event.parse_attribute_value::<usize>("s")? {
                        kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
            }
            Event::Start(event) if kind != CellType::Empty && event.local_name().as_ref() == TAG_INLINE_STRING => {
                value = reader.read_text(TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if kind != CellType::Empty && event.local_name().as_ref() == TAG_VALUE => {
                value = reader.read_text(TAG_VALUE, true)?;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_CELL => {
                if kind != CellType::Empty && !value.is_empty() {
                    if is_shared {
                        value = shared_string(&self.name, &self.shared_strings, &value, row, col)?;
                    }
                    sheet.push(Cell {
                        row,
                        col,
                        kind,
                        value: std::mem::take(&mut value),
                    });
                }
                kind = CellType::Empty;
                is_shared = false;
            }
        });
        Ok(sheet)
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn read_sheets(&mut self) -> Result<Vec<Sheet>, SheetJsonError> {
        let mut sheets = Vec::with_capacity(self.sheets.len());
        for (sheet_name, zip_path) in self.sheets.clone() {
            let sheet = self.read_sheet(&sheet_name, &zip_path).with_prefix(&sheet_name)?;
            debug!(sheet = %sheet_name, dimension = ?sheet.dimension(), "read worksheet");
            sheets.push(sheet);
        }
        Ok(sheets)
    }
}

/// Resolves a shared string index; a dangling index gives empty text.
fn shared_string(
    file_name: &str,
    shared_strings: &[String],
    index: &str,
    row: usize,
    col: usize,
) -> Result<String, SheetJsonError> {
    let index = index.trim().parse::<usize>()?;
    match shared_strings.get(index) {
        Some(string) => Ok(string.to_owned()),
        None => {
            warn!(
                file = file_name,
                cell = %index_to_reference(row, col),
                index,
                "shared string index out of range"
            );
            Ok(String::new())
        }
    }
}

/// Reads worksheet names and part paths from `xl/workbook.xml`, plus the date system.
fn load_workbook(zip: &mut ZipArchive<Cursor<Vec<u8>>>) -> Result<(Vec<(String, String)>, bool), SheetJsonError> {
    let relationships = excel::load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip
        .xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::MissingPartError("xl/workbook.xml".to_owned()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHEET => {
            let name = event.get_attribute_value("name")?;
            let id = event.get_attribute_value("id")?;
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(id.as_ref()) {
                    sheets.push((name.into_owned(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event
                .get_attribute_value("date1904")?
                .map(|value| value == "1" || value == "true")
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads the whole shared string table; a workbook without one has none.
fn load_shared_strings(zip: &mut ZipArchive<Cursor<Vec<u8>>>) -> Result<Vec<String>, SheetJsonError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader("xl/sharedStrings.xml")? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHARED_STRING_ITEM => {
            shared_strings.push(reader.read_text(TAG_SHARED_STRING_ITEM, false)?);
        }
    });
    Ok(shared_strings)
}


#[cfg(test)]
mod tests {
    use super::testing::XlsxBuilder;
    use super::*;
    use crate::error::FailureKind;
    use crate::normalize::RawValue;

    fn open(bytes: Vec<u8>) -> XlsxSpreadsheet {
        XlsxSpreadsheet::open("test.xlsx", bytes).unwrap()
    }

    #[test]
    fn reads_sheet_names_in_workbook_order() {
        let bytes = XlsxBuilder::new().sheet("Zeta", "").sheet("Alpha", "").build();
        let spreadsheet = open(bytes);
        assert_eq!(spreadsheet.sheet_names(), vec!["Zeta", "Alpha"]);
        assert_eq!(spreadsheet.name(), "test.xlsx");
    }

    #[test]
    fn reads_typed_cells() {
        let rows = r#"
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>ok</t></is></c><c r="C1" t="b"><v>1</v></c></row>
            <row r="2"><c r="A2"><v>3.5</v></c><c r="B2" t="e"><v>#N/A</v></c><c r="C2" t="str"><v>formula text</v></c></row>
            <row r="4"><c r="B4" t="d"><v>2024-02-03T04:05:06</v></c></row>"#;
        let bytes = XlsxBuilder::new().shared_strings(&["name"]).sheet("S", rows).build();
        let mut spreadsheet = open(bytes);
        let sheets = spreadsheet.read_sheets().unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].dimension().as_deref(), Some("A1:C4"));

        let rows = sheets.into_iter().next().unwrap().into_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&RawValue::Number(3.5)));
        assert_eq!(rows[0].get("ok"), None);
        assert_eq!(rows[0].get("true"), Some(&RawValue::from("formula text")));
        assert_eq!(rows[1].get("ok"), Some(&RawValue::from("2024-02-03 04:05:06")));
    }

    #[test]
    fn cells_without_references_follow_position() {
        let rows = r#"<row><c t="inlineStr"><is><t>a</t></is></c><c t="inlineStr"><is><t>b</t></is></c></row>
            <row><c><v>1</v></c><c><v>2</v></c></row>"#;
        let mut spreadsheet = open(XlsxBuilder::new().sheet("S", rows).build());
        let rows = spreadsheet.read_sheets().unwrap().remove(0).into_rows();
        assert_eq!(rows[0].get("a"), Some(&RawValue::Number(1.0)));
        assert_eq!(rows[0].get("b"), Some(&RawValue::Number(2.0)));
    }

    #[test]
    fn date_styles_render_dates() {
        let styles = r#"<numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy-mm-dd hh:mm"/></numFmts>
            <cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="14"/><xf numFmtId="164"/></cellXfs>"#;
        let rows = r#"<row r="1"><c r="A1" t="inlineStr"><is><t>d</t></is></c><c r="B1" t="inlineStr"><is><t>dt</t></is></c><c r="C1" t="inlineStr"><is><t>n</t></is></c></row>
            <row r="2"><c r="A2" s="1"><v>45292</v></c><c r="B2" s="2"><v>45292.5</v></c><c r="C2" s="0"><v>7</v></c></row>"#;
        let mut spreadsheet = open(XlsxBuilder::new().styles(styles).sheet("S", rows).build());
        let rows = spreadsheet.read_sheets().unwrap().remove(0).into_rows();
        assert_eq!(rows[0].get("d"), Some(&RawValue::from("2024-01-01")));
        assert_eq!(rows[0].get("dt"), Some(&RawValue::from("2024-01-01 12:00:00")));
        assert_eq!(rows[0].get("n"), Some(&RawValue::Number(7.0)));
    }

    #[test]
    fn date1904_workbooks() {
        let styles = r#"<cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14"/></cellXfs>"#;
        let rows = r#"<row r="1"><c r="A1" t="inlineStr"><is><t>d</t></is></c></row><row r="2"><c r="A2" s="1"><v>0</v></c></row>"#;
        let mut spreadsheet = open(XlsxBuilder::new().date1904().styles(styles).sheet("S", rows).build());
        let rows = spreadsheet.read_sheets().unwrap().remove(0).into_rows();
        assert_eq!(rows[0].get("d"), Some(&RawValue::from("1904-01-01")));
    }

    #[test]
    fn workbook_without_sheets_is_an_error() {
        let error = XlsxSpreadsheet::open("empty.xlsx", XlsxBuilder::new().build()).err().unwrap();
        assert!(matches!(
            error,
            SheetJsonError::SpreadsheetError(SpreadsheetError::EmptyWorkbookError(_))
        ));
        assert_eq!(error.kind(), FailureKind::EmptyResult);
    }

    #[test]
    fn non_zip_bytes_are_an_error() {
        assert!(XlsxSpreadsheet::open("bad.xlsx", b"not a zip".to_vec()).is_err());
    }
}
