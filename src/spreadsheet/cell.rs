use crate::normalize::RawValue;
use crate::spreadsheet::reference::index_to_reference;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use std::fmt::Display;

/// Types of cell data in workbook files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values stored as `1`/`0` (or `true`/`false`)
    Boolean,
    /// Plain numeric values
    Number,
    /// Serial numbers under a date format
    Date,
    /// Serial numbers under a time-only format
    Time,
    /// Serial numbers under a date and time format
    DateTime,
    /// ISO 8601 date/time strings (`t="d"`)
    IsoDateTime,
    /// Literal text, inline or already resolved from the shared string table
    Text,
    /// Error values such as `#N/A`
    Error,
}

impl CellType {
    /// Maps built-in Excel number format IDs to date/time types.
    pub(crate) fn parse_builtin_number_format_id(id: u32) -> Option<Self> {
        match id {
            22 => Some(Self::DateTime),
            14..=17 => Some(Self::Date),
            18..=21 | 45..=47 => Some(Self::Time),
            _ => None,
        }
    }

    /// Classifies a custom number format string by its date and time tokens.
    /// Quoted literals, escaped characters and bracketed sections are ignored.
    pub(crate) fn parse_custom_number_format(format: &str) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_bracket = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time) {
            (true, true) => Self::DateTime,
            (true, false) => Self::Date,
            (false, true) => Self::Time,
            (false, false) => Self::Number,
        }
    }

    /// Whether numeric values of this type are rendered through the date system.
    pub(crate) fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::DateTime)
    }
}

/// Converts Excel error codes to their display strings.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A single worksheet cell with position, type, and textual value.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    pub(crate) value: String,
}

impl Cell {
    /// Returns the A1-style reference of the cell.
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Converts the cell into the value handed to the normalizer.
    /// Empty and error cells give `None`: the column is absent for the row.
    pub(crate) fn to_raw_value(&self, is_1904: bool) -> Option<RawValue> {
        let value = match self.kind {
            CellType::Empty | CellType::Error => return None,
            CellType::Boolean => RawValue::Bool(self.value == "1" || self.value.eq_ignore_ascii_case("true")),
            CellType::Number => match self.value.trim().parse::<f64>() {
                Ok(number) => RawValue::Number(number),
                Err(_) => RawValue::Text(self.value.to_owned()),
            },
            CellType::Date | CellType::Time | CellType::DateTime => {
                match self.value.trim().parse::<f64>().ok().and_then(|serial| {
                    to_temporal_string(serial, self.kind, is_1904)
                }) {
                    Some(text) => RawValue::Text(text),
                    None => RawValue::Text(self.value.to_owned()),
                }
            }
            CellType::IsoDateTime => RawValue::Text(self.value.replacen('T', " ", 1)),
            CellType::Text => RawValue::Text(self.value.to_owned()),
        };
        Some(value)
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={:?}", self.reference(), self.value)
    }
}

/// Converts an Excel serial number to a calendar date and time.
/// The 1900 system keeps the Lotus 1-2-3 leap-year bug: serials below 60 shift by a day.
pub(crate) fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.floor();
    let milliseconds = ((serial - days) * 86_400_000f64).round() as i64;
    let days = days as i64
        + if is_1904 {
            1462
        } else if days < 60.0 {
            1
        } else {
            0
        };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    epoch
        .checked_add_signed(Duration::try_days(days)?)?
        .checked_add_signed(Duration::try_milliseconds(milliseconds)?)
}

fn to_temporal_string(serial: f64, kind: CellType, is_1904: bool) -> Option<String> {
    let datetime = serial_to_datetime(serial, is_1904)?;
    let time_format = if datetime.and_utc().timestamp_subsec_millis() > 0 {
        "%H:%M:%S%.3f"
    } else {
        "%H:%M:%S"
    };
    let text = match kind {
        CellType::Date => datetime.format("%Y-%m-%d").to_string(),
        CellType::Time => datetime.format(time_format).to_string(),
        _ => format!("{} {}", datetime.format("%Y-%m-%d"), datetime.format(time_format)),
    };
    Some(text)
}
