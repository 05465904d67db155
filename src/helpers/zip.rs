//! ZIP archive helper utilities for Office Open XML workbooks

use crate::error::SheetJsonError;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

/// Helper trait for ZIP archive part lookup
pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Gets a part by name (case-insensitive, path separator agnostic)
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetJsonError>;

    /// Creates an XML reader over a part
    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, SheetJsonError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetJsonError> {
        let pattern = name.replace('\\', "/");
        let pattern = pattern.trim_start_matches('/');
        let path = self
            .file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(file_name.replace('\\', "/").trim_start_matches('/')))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(file) => Ok(file),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, SheetJsonError> {
        let reader = self.file(name)?.map(|file| XmlReader::new(BufReader::new(file)));
        Ok(reader)
    }
}
