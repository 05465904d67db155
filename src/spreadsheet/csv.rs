//! CSV adapter: decoded text to header-keyed rows of text values.
use crate::error::SheetJsonError;
use crate::helpers::text::decode_text;
use crate::normalize::RawValue;
use crate::normalize::Row;
use csv::ReaderBuilder;
use csv::StringRecord;
use tracing::debug;

/// Column collecting the fields of a record that run past the header.
pub const PARSED_EXTRA: &str = "__parsed_extra";

/// Reads a CSV file into rows.
///
/// The first non-empty record is the header. Short records leave the trailing
/// columns absent; fields beyond the header are kept, in order, as a list
/// under [`PARSED_EXTRA`].
pub fn read_rows(file_name: &str, bytes: &[u8]) -> Result<Vec<Row>, SheetJsonError> {
    let text = decode_text(file_name, bytes);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut header: Option<StringRecord> = None;
    let mut rows = Vec::new();
    let mut extra_fields = 0usize;
    for record in reader.records() {
        let record = record?;
        if is_empty_line(&record) {
            continue;
        }
        if header.is_none() {
            header = Some(record);
            continue;
        }
        let Some(header) = &header else { continue };
        let mut row = header.iter().zip(record.iter()).collect::<Row>();
        if record.len() > header.len() {
            let extra: Vec<String> = record.iter().skip(header.len()).map(str::to_owned).collect();
            extra_fields += extra.len();
            row.insert(PARSED_EXTRA, RawValue::List(extra));
        }
        rows.push(row);
    }

    if extra_fields > 0 {
        debug!(file = file_name, extra_fields, "kept fields beyond the header");
    }
    debug!(file = file_name, rows = rows.len(), "read csv rows");
    Ok(rows)
}

fn is_empty_line(record: &StringRecord) -> bool {
    record.len() == 1 && record.get(0).is_some_and(str::is_empty)
}
