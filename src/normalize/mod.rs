//! # Row Normalization
//!
//! Turns flat header-keyed rows into normalized JSON records:
//!
//! 1. scalar columns are copied with [`normalize_value`] applied,
//! 2. `yearsExperience` is floored to an integer when it parses as a number,
//! 3. indexed columns (`skills[0]`, `skills[1]`, ...) are collapsed into arrays,
//! 4. remaining comma-separated strings are split into arrays.
//!
//! The pipeline is pure: the same rows always produce the same records.
pub mod groups;
pub mod row;

pub use groups::ArrayColumnGroups;
pub use row::RawValue;
pub use row::Row;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use tracing::debug;

/// Output record: field name to JSON value, in insertion order.
pub type Record = Map<String, Value>;

/// The one field that gets integer coercion.
pub const YEARS_EXPERIENCE: &str = "yearsExperience";

/// Longest leading float literal, the way JavaScript `parseFloat` reads it.
static FLOAT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:Infinity|(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)")
        .expect("Hardcode regex pattern")
});

/// Normalizes every row of one table.
///
/// Array groups come from the first row's columns and are reused for all rows.
/// Columns that only appear in later rows never form groups.
pub fn convert_table(rows: &[Row]) -> Vec<Record> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let groups = ArrayColumnGroups::detect(first.columns());
    debug!(rows = rows.len(), groups = groups.len(), "normalizing table");
    rows.iter().map(|row| row_to_record(row, &groups)).collect()
}

/// Builds one record from one row.
pub fn row_to_record(row: &Row, groups: &ArrayColumnGroups) -> Record {
    let mut record = Record::new();

    for (column, value) in row.iter() {
        if !groups.contains_column(column) {
            record.insert(column.to_owned(), normalize_value(value));
        }
    }

    coerce_years_experience(&mut record);

    for (base, columns) in groups.iter() {
        let values: Vec<Value> = columns
            .iter()
            .map(|column| row.get(column).map(normalize_value).unwrap_or(Value::Null))
            .filter(|value| !value.is_null())
            .collect();
        record.insert(base.to_owned(), Value::Array(values));
    }

    split_comma_separated(&mut record, groups);
    record
}

/// Cleans one raw cell value.
///
/// Null and `NaN` become null; strings are trimmed and empty strings become
/// null; other numbers and booleans pass through.
pub fn normalize_value(value: &RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Number(number) if number.is_nan() => Value::Null,
        RawValue::Number(number) => number_to_json(*number),
        RawValue::Bool(value) => Value::Bool(*value),
        RawValue::Text(text) => match trim(text) {
            "" => Value::Null,
            trimmed => Value::String(trimmed.to_owned()),
        },
        RawValue::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
    }
}

/// Integral values below 1e21 render as plain integer digits; non-finite
/// ones as null.
pub(crate) fn number_to_json(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < 1e21 {
        if number.abs() < 9.2e18 {
            return Value::Number(Number::from(number as i64));
        }
        // f64 `Display` never switches to exponent notation
        if let Ok(number) = serde_json::from_str::<Number>(&number.to_string()) {
            return Value::Number(number);
        }
    }
    Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
}

fn coerce_years_experience(record: &mut Record) {
    let Some(value) = record.get_mut(YEARS_EXPERIENCE) else {
        return;
    };
    let parsed = match &*value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_float_prefix(text),
        _ => None,
    };
    if let Some(number) = parsed {
        *value = number_to_json(number.floor());
    }
}

fn split_comma_separated(record: &mut Record, groups: &ArrayColumnGroups) {
    for (key, value) in record.iter_mut() {
        let Value::String(text) = &*value else {
            continue;
        };
        if !text.contains(',') || groups.contains_base(key) {
            continue;
        }
        let items: Vec<Value> = text
            .split(',')
            .map(trim)
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(item.to_owned()))
            .collect();
        if items.len() > 1 {
            *value = Value::Array(items);
        }
    }
}

/// Leading float of `text`, or `None` where `parseFloat` would give `NaN`.
fn parse_float_prefix(text: &str) -> Option<f64> {
    let literal = FLOAT_PREFIX.find(trim(text))?.as_str();
    match literal.strip_prefix(['+', '-']).unwrap_or(literal) {
        "Infinity" if literal.starts_with('-') => Some(f64::NEG_INFINITY),
        "Infinity" => Some(f64::INFINITY),
        _ => literal.parse::<f64>().ok(),
    }
}

/// Whitespace trim that also drops the byte order mark.
fn trim(text: &str) -> &str {
    // NEL is not stripped
    text.trim_matches(|c: char| (c.is_whitespace() && c != '\u{85}') || c == '\u{feff}')
}
