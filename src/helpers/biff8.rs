//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Record reader for Excel 97-2003 workbooks, with the BIFF5 string layout
//! of Excel 5.0/95 as a fallback.

use crate::error::SheetJsonError;
use encoding_rs::Encoding;
use encoding_rs::UTF_16LE;
use encoding_rs::WINDOWS_1252;
use thiserror::Error;

const CONTINUE: u16 = 60;

/// Errors specific to BIFF8 format parsing
#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining")]
    NoEnoughDataError(usize),
}

/// Reader over the records of a workbook stream.
/// A record and its CONTINUE records are exposed as one logical record.
pub(crate) struct Biff8Reader {
    /// Encoding of 8-bit BIFF5 strings, set from the CODEPAGE record
    pub(crate) encoding: &'static Encoding,
    /// BIFF5 strings carry no option flags and no UTF-16 form
    pub(crate) is_biff5: bool,
    buffer: Vec<u8>,
    pointer: usize,              // Next record position in buffer
    chunks: Vec<(usize, usize)>, // Current record chunks (start, end)
    index: usize,                // Current chunk index
    offset: usize,               // Offset within current chunk
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: WINDOWS_1252,
            is_biff5: false,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Advances to the next record and returns its type, or `None` at the end of the stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, SheetJsonError> {
        let Some((kind, lower, upper)) = self.header_at(self.pointer) else {
            return Ok(None);
        };
        self.index = 0;
        self.offset = 0;
        self.pointer = upper;
        self.chunks.clear();
        self.chunks.push((lower, upper));
        while let Some((CONTINUE, lower, upper)) = self.header_at(self.pointer) {
            self.pointer = upper;
            self.chunks.push((lower, upper));
        }
        Ok(Some(kind))
    }

    fn header_at(&self, pointer: usize) -> Option<(u16, usize, usize)> {
        let header = self.buffer.get(pointer..pointer.checked_add(4)?)?;
        let kind = u16::from_le_bytes([header[0], header[1]]);
        let size = u16::from_le_bytes([header[2], header[3]]) as usize;
        let lower = pointer + 4;
        let upper = self.buffer.len().min(lower + size);
        Some((kind, lower, upper))
    }

    /// Position of the record `next` would return.
    pub(crate) fn position(&self) -> usize {
        self.pointer
    }

    /// Moves to an absolute stream position, such as a BOUNDSHEET8 offset.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
    }

    /// Total data length of the current record including its continuations.
    pub(crate) fn record_len(&self) -> usize {
        self.chunks.iter().map(|(lower, upper)| upper - lower).sum()
    }

    /// Reads up to `length` bytes without leaving the current chunk.
    fn read(&mut self, length: usize) -> &[u8] {
        while let Some((lower, upper)) = self.chunks.get(self.index) {
            if lower + self.offset < *upper {
                break;
            }
            self.index += 1;
            self.offset = 0;
        }
        let Some((lower, upper)) = self.chunks.get(self.index).copied() else {
            return &[];
        };
        let source = lower + self.offset;
        let target = upper.min(source + length);
        if target == upper {
            self.index += 1;
            self.offset = 0;
        } else {
            self.offset += target - source;
        }
        &self.buffer[source..target]
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], SheetJsonError> {
        let mut array = [0u8; N];
        let mut filled = 0;
        while filled < N {
            let data = self.read(N - filled);
            if data.is_empty() {
                Err(Biff8Error::NoEnoughDataError(N))?;
            }
            array[filled..filled + data.len()].copy_from_slice(data);
            filled += data.len();
        }
        Ok(array)
    }

    /// Skips `length` bytes, crossing continuation boundaries.
    pub(crate) fn skip(&mut self, length: usize) -> Result<(), SheetJsonError> {
        let mut remaining = length;
        while remaining > 0 {
            let size = self.read(remaining).len();
            if size == 0 {
                Err(Biff8Error::NoEnoughDataError(length))?;
            }
            remaining -= size;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, SheetJsonError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, SheetJsonError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, SheetJsonError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, SheetJsonError> {
        Ok(self.read_u32()? as usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, SheetJsonError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, SheetJsonError> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Reads an RK number: a 30-bit integer or the high bits of a double,
    /// optionally scaled by 1/100.
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, SheetJsonError> {
        Ok(decode_rk(self.read_u32()?))
    }

    /// Reads a string with a 1-byte character count.
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, SheetJsonError> {
        let chars = self.read_u8()? as usize;
        self.read_string(chars, false)
    }

    /// Reads a string with a 2-byte character count.
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, SheetJsonError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars, false)
    }

    /// Reads a shared string table entry, dropping rich text runs and phonetic data.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, SheetJsonError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars, true)
    }

    fn read_string(&mut self, chars: usize, is_extended: bool) -> Result<String, SheetJsonError> {
        if self.is_biff5 {
            let mut bytes = Vec::with_capacity(chars);
            while bytes.len() < chars {
                let data = self.read(chars - bytes.len());
                if data.is_empty() {
                    Err(Biff8Error::NoEnoughDataError(chars))?;
                }
                bytes.extend_from_slice(data);
            }
            let (string, _, _) = self.encoding.decode(&bytes);
            return Ok(string.into_owned());
        }

        let flag = self.read_u8()?;
        let mut is_high_byte = (flag & 0x1) > 0;
        let rich_runs = if is_extended && (flag & 0x8) > 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_size = if is_extended && (flag & 0x4) > 0 {
            self.read_usize()?
        } else {
            0
        };

        let mut content = String::with_capacity(chars);
        let mut remaining = chars;
        while remaining > 0 {
            let expected = if is_high_byte { remaining << 1 } else { remaining };
            let bytes = self.read(expected);
            if bytes.is_empty() {
                Err(Biff8Error::NoEnoughDataError(expected))?;
            }
            let actual = if is_high_byte {
                let (string, _) = UTF_16LE.decode_without_bom_handling(bytes);
                content.push_str(&string);
                bytes.len() >> 1
            } else {
                content.extend(bytes.iter().map(|byte| *byte as char));
                bytes.len()
            };
            remaining = remaining.saturating_sub(actual);
            if remaining > 0 {
                // a string split by CONTINUE restates its width flag
                is_high_byte = (self.read_u8()? & 0x1) > 0;
            }
        }

        self.skip(4 * rich_runs)?;
        self.skip(phonetic_size)?;
        Ok(content)
    }
}

/// Decodes an RkNumber value.
pub(crate) fn decode_rk(value: u32) -> f64 {
    let is_scaled = (value & 0x01) != 0;
    let is_integer = (value & 0x02) != 0;
    let number = if is_integer {
        ((value as i32) >> 2) as f64
    } else {
        f64::from_bits(((value & 0xFFFF_FFFC) as u64) << 32)
    };
    if is_scaled {
        number / 100.0
    } else {
        number
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, data: &[u8]) -> Vec<u8> {
        let mut bytes = kind.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    #[test]
    fn rk_numbers() {
        assert_eq!(decode_rk((42 << 2) | 0x02), 42.0);
        assert_eq!(decode_rk(((-7i32 << 2) as u32) | 0x02), -7.0);
        assert_eq!(decode_rk((1234 << 2) | 0x03), 12.34);
        let bits = (1.5f64.to_bits() >> 32) as u32;
        assert_eq!(decode_rk(bits), 1.5);
    }

    #[test]
    fn reads_records_and_stops_at_end() {
        let mut stream = record(0x0203, &[1, 0, 2, 0]);
        stream.extend(record(0x000A, &[]));
        let mut reader = Biff8Reader::new(stream);

        assert_eq!(reader.next().unwrap(), Some(0x0203));
        assert_eq!(reader.record_len(), 4);
        assert_eq!(reader.read_u16().unwrap(), 1);
        assert_eq!(reader.read_u16().unwrap(), 2);
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.next().unwrap(), Some(0x000A));
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn strings_continue_across_records() {
        // "Hello" split after "He"; the continuation switches to UTF-16
        let mut stream = record(0x0204, &[5, 0, 0, b'H', b'e']);
        stream.extend(record(CONTINUE, &[1, b'l', 0, b'l', 0, b'o', 0]));
        let mut reader = Biff8Reader::new(stream);

        assert_eq!(reader.next().unwrap(), Some(0x0204));
        assert_eq!(reader.record_len(), 12);
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "Hello");
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn rich_strings_skip_runs() {
        let mut data = vec![2, 0, 0x08, 1, 0, b'o', b'k'];
        data.extend([0u8; 4]);
        data.extend([1, 0, 0, b'x']);
        let mut reader = Biff8Reader::new(record(0x00FC, &data));

        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_rich_extended_string().unwrap(), "ok");
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "x");
    }

    #[test]
    fn compressed_strings_are_latin1() {
        let mut reader = Biff8Reader::new(record(0x0204, &[2, 0, 0, 0xE9, 0xFC]));
        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "éü");
    }

    #[test]
    fn uncompressed_strings_are_utf16() {
        let mut reader = Biff8Reader::new(record(0x0204, &[2, 0, 1, 0x1F, 0x04, 0x2D, 0x4E]));
        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "П中");
    }

    #[test]
    fn biff5_strings_use_code_page() {
        let mut reader = Biff8Reader::new(record(0x0204, &[2, 0, 0xC0, 0xE0]));
        reader.is_biff5 = true;
        reader.encoding = codepage::to_encoding(1251).unwrap();
        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "Аа");
    }
}
