//! Office Open XML workbook helpers shared by the XLSX reader
use crate::error::SheetJsonError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use zip::ZipArchive;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const TAG_CUSTOM_FORMATS: &[u8] = b"numFmts";
const TAG_CUSTOM_FORMAT: &[u8] = b"numFmt";
const TAG_FORMAT_INDEXES: &[u8] = b"cellXfs";
const TAG_FORMAT_INDEX: &[u8] = b"xf";

/// Loads worksheet relationships: relationship ID to part path.
pub(super) fn load_relationships<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    path: &str,
) -> Result<HashMap<String, String>, SheetJsonError> {
    let mut reader = zip
        .xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::MissingPartError(path.to_owned()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Only worksheets, not chartsheets or dialog sheets
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.into_owned(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Loads the cell style table of `xl/styles.xml`: style index to cell type.
pub(super) fn load_number_formats<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<Vec<CellType>, SheetJsonError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<u32, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<u32>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.local_name().as_ref() == TAG_CUSTOM_FORMAT => {
            let id = event.parse_attribute_value::<u32>("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                custom_formats.insert(id, CellType::parse_custom_number_format(&format));
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => break,
        Event::Start(event) if format_indexes_context && event.local_name().as_ref() == TAG_FORMAT_INDEX => {
            format_indexes.push(event.parse_attribute_value::<u32>("numFmtId")?.unwrap_or(0));
        }
    });

    Ok(resolve_number_formats(&format_indexes, &custom_formats))
}

/// Maps format IDs to cell types using custom formats first, then built-in IDs.
pub(super) fn resolve_number_formats(format_indexes: &[u32], custom_formats: &HashMap<u32, CellType>) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(*id))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Resolves a relationship target to a part path inside the archive.
pub(crate) fn to_zip_path(path: &str) -> String {
    if let Some(absolute) = path.strip_prefix('/') {
        absolute.to_owned()
    } else if path.starts_with("xl/") {
        path.to_owned()
    } else {
        format!("xl/{}", path.trim_start_matches("./"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_paths() {
        assert_eq!(to_zip_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path("/xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path("xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn custom_formats_override_builtin_ids() {
        let custom = HashMap::from([(164, CellType::DateTime), (14, CellType::Number)]);
        let types = resolve_number_formats(&[0, 164, 14, 21], &custom);
        assert_eq!(types, vec![CellType::Number, CellType::DateTime, CellType::Number, CellType::Time]);
    }
}
