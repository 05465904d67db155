//! XML parsing utilities for Office Open XML workbook parts
//! Provides an XML reader wrapper and helper traits for attributes and text

use crate::error::SheetJsonError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

/// Element holding literal text inside a string item
const TAG_TEXT: &[u8] = b"t";
/// Phonetic run, skipped when collecting text
const TAG_PHONETIC_TEXT: &[u8] = b"rPh";

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Parse attribute value '{0}' failed")]
    ParseAttributeValueError(String),
}

/// XML reader wrapper configured for workbook parts
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlReader { reader, buffer }
    }

    /// Reads the next XML event, `None` at end of input
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, SheetJsonError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(SheetJsonError::XmlError(error)),
        }
    }

    /// Collects the text up to the closing `end` element.
    ///
    /// With `is_text_content` every text node counts (as inside `<v>`);
    /// otherwise only `<t>` runs do, which concatenates rich text and drops
    /// phonetic `<rPh>` runs.
    pub(crate) fn read_text(&mut self, end: &[u8], is_text_content: bool) -> Result<String, SheetJsonError> {
        let mut is_phonetic_text = false;
        let mut is_text = is_text_content;
        let mut text = String::new();
        while let Some(event) = self.next()? {
            match event {
                Event::End(event) if event.local_name().as_ref() == end => break,
                Event::Start(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
                Event::End(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
                Event::Start(event) if !is_phonetic_text && event.local_name().as_ref() == TAG_TEXT => is_text = true,
                Event::End(event) if is_text && event.local_name().as_ref() == TAG_TEXT => is_text = false,
                Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
                Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
                Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
                _ => (),
            }
        }
        Ok(text)
    }
}

/// Attribute access on start tags, matched by local name
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets the unescaped value of an attribute
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetJsonError>;

    /// Parses an attribute value to the specified type
    fn parse_attribute_value<T: FromStr>(&'a self, name: &str) -> Result<Option<T>, SheetJsonError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetJsonError> {
        for result in self.attributes() {
            let attribute = result?;
            if attribute.key.local_name().as_ref() == name.as_bytes() {
                return Ok(Some(attribute.unescape_value()?));
            }
        }
        Ok(None)
    }

    fn parse_attribute_value<T: FromStr>(&'a self, name: &str) -> Result<Option<T>, SheetJsonError> {
        match self.get_attribute_value(name)? {
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| XmlError::ParseAttributeValueError(value.to_string()).into()),
            None => Ok(None),
        }
    }
}

/// Helper trait for building text content from XML events
pub(crate) trait XmlTextContextHelper {
    /// Appends the text of an entity or character reference
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetJsonError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetJsonError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix(['x', 'X']) {
                u32::from_str_radix(hex, 16)?
            } else {
                number.parse::<u32>()?
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }

        Ok(())
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(xml: &str) -> XmlReader<&[u8]> {
        XmlReader::new(xml.as_bytes())
    }

    #[test]
    fn read_text_concatenates_runs_and_skips_phonetics() {
        let mut reader = reader(
            "<si><r><t>Hel</t></r><r><t xml:space=\"preserve\">lo &amp; &#x263A;</t></r>\
             <rPh><t>ignored</t></rPh></si>",
        );
        reader.next().unwrap();
        assert_eq!(reader.read_text(b"si", false).unwrap(), "Hello & \u{263A}");
    }

    #[test]
    fn read_text_of_value_element() {
        let mut reader = reader("<v>42.5</v><v>next</v>");
        reader.next().unwrap();
        assert_eq!(reader.read_text(b"v", true).unwrap(), "42.5");
    }

    #[test]
    fn attributes_by_local_name() {
        let mut reader = reader("<x:c r=\"B2\" s=\" 3 \" t=\"s\" bad=\"x\"/>");
        let Some(Event::Start(event)) = reader.next().unwrap() else {
            panic!("expected a start tag");
        };
        let event = event.into_owned();
        assert_eq!(event.get_attribute_value("r").unwrap().as_deref(), Some("B2"));
        assert_eq!(event.parse_attribute_value::<usize>("s").unwrap(), Some(3));
        assert_eq!(event.parse_attribute_value::<usize>("missing").unwrap(), None);
        assert!(event.parse_attribute_value::<usize>("bad").is_err());
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let mut reader = reader("<t>&bogus;</t>");
        reader.next().unwrap();
        assert!(reader.read_text(b"t", true).is_err());
    }
}
