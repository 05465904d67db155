//! OLE Compound File Binary (CFB) reader for legacy Excel (.xls) workbooks
//! and encrypted OOXML containers.

use crate::error::SheetJsonError;
use crate::helpers::bytes::to_usize_iter;
use crate::helpers::bytes::u16_at;
use crate::helpers::bytes::u64_at;
use crate::helpers::bytes::usize_at;
use encoding_rs::UTF_16LE;
use thiserror::Error;

const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const MAX_REG_SECT: usize = 0xFFFF_FFFA;
const HEADER_SIZE: usize = 512;
const MINI_SECTOR_SIZE: usize = 64;
const DIRECTORY_ENTRY_SIZE: usize = 128;

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid Sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Sector '{0}' lies outside the file")]
    SectorRangeError(usize),

    #[error("Sector chain starting at '{0}' is cyclic")]
    SectorChainError(usize),

    #[error("The number of file allocation table sectors error: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Empty Root directory")]
    RootDirectoryError,
}

/// Whether `bytes` start with the compound file signature.
pub(crate) fn is_cfb(bytes: &[u8]) -> bool {
    u64_at(bytes, 0) == Some(SIGNATURE)
}

/// Compound file held in memory with its allocation tables resolved.
pub(crate) struct Cfb {
    data: Vec<u8>,
    sector_size: usize,
    mini_cutoff: usize,
    file_allocation_table: Vec<usize>,
    mini_file_allocation_table: Vec<usize>,
    mini_stream: Vec<u8>,
    directories: Vec<Directory>,
}

impl Cfb {
    /// Parses the header, allocation tables and directory of `data`.
    pub(crate) fn parse(data: Vec<u8>) -> Result<Cfb, SheetJsonError> {
        if data.len() < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        let header = Header::new(&data)?;
        let sector_size = header.sector_size()?;

        let mut cfb = Cfb {
            data,
            sector_size,
            mini_cutoff: header.mini_cutoff,
            file_allocation_table: Vec::new(),
            mini_file_allocation_table: Vec::new(),
            mini_stream: Vec::new(),
            directories: Vec::new(),
        };
        cfb.file_allocation_table = cfb.load_file_allocation_table(&header)?;

        let directory_bytes = cfb.read_chain(header.directory_start)?;
        cfb.directories = directory_bytes
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .filter_map(|bytes| Directory::new(bytes, header.major_version))
            .collect();
        let root = cfb
            .directories
            .iter()
            .find(|directory| directory.kind == DirectoryKind::Root)
            .ok_or(CfbError::RootDirectoryError)?;
        let (root_start, root_size) = (root.start, root.size);

        if header.mini_file_allocation_table_count > 0 {
            let bytes = cfb.read_chain(header.mini_file_allocation_table_start)?;
            cfb.mini_file_allocation_table = to_usize_iter(&bytes).collect();
        }
        if root_size > 0 {
            let mut mini_stream = cfb.read_chain(root_start)?;
            mini_stream.truncate(root_size);
            cfb.mini_stream = mini_stream;
        }

        Ok(cfb)
    }

    /// Checks if a stream exists, comparing names case-insensitively.
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Reads the contents of a stream.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, SheetJsonError> {
        let Some(directory) = self.find(name) else {
            return Ok(None);
        };
        let mut bytes = if directory.size < self.mini_cutoff {
            self.read_mini_chain(directory.start)?
        } else {
            self.read_chain(directory.start)?
        };
        bytes.truncate(directory.size);
        Ok(Some(bytes))
    }

    fn find(&self, name: &str) -> Option<&Directory> {
        self.directories
            .iter()
            .find(|directory| directory.kind == DirectoryKind::Stream && directory.name.eq_ignore_ascii_case(name))
    }

    fn load_file_allocation_table(&self, header: &Header) -> Result<Vec<usize>, SheetJsonError> {
        let mut difat: Vec<usize> = to_usize_iter(&self.data[76..HEADER_SIZE]).collect();
        let mut next = header.difat_start;
        let mut visited = 0usize;
        while next <= MAX_REG_SECT {
            visited += 1;
            if visited > header.difat_count.max(1) * 2 + 1 {
                Err(CfbError::SectorChainError(header.difat_start))?;
            }
            let sector = self.sector(next)?;
            let mut ids: Vec<usize> = to_usize_iter(sector).collect();
            next = ids.pop().ok_or(CfbError::FileFormatError)?;
            difat.extend(ids);
        }

        let mut file_allocation_table = Vec::new();
        let mut count = 0usize;
        for index in difat.into_iter().filter(|index| *index <= MAX_REG_SECT) {
            file_allocation_table.extend(to_usize_iter(self.sector(index)?));
            count += 1;
        }
        if count != header.file_allocation_table_count {
            Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count))?;
        }
        Ok(file_allocation_table)
    }

    fn sector(&self, index: usize) -> Result<&[u8], SheetJsonError> {
        let start = index
            .checked_add(1)
            .and_then(|position| position.checked_mul(self.sector_size))
            .ok_or(CfbError::SectorRangeError(index))?;
        if start >= self.data.len() {
            Err(CfbError::SectorRangeError(index))?;
        }
        let end = self.data.len().min(start + self.sector_size);
        Ok(&self.data[start..end])
    }

    fn read_chain(&self, start: usize) -> Result<Vec<u8>, SheetJsonError> {
        let mut content = Vec::new();
        let mut index = start;
        let mut steps = 0usize;
        while index <= MAX_REG_SECT {
            steps += 1;
            if steps > self.file_allocation_table.len() {
                Err(CfbError::SectorChainError(start))?;
            }
            content.extend_from_slice(self.sector(index)?);
            index = *self
                .file_allocation_table
                .get(index)
                .ok_or(CfbError::SectorRangeError(index))?;
        }
        Ok(content)
    }

    fn read_mini_chain(&self, start: usize) -> Result<Vec<u8>, SheetJsonError> {
        let mut content = Vec::new();
        let mut index = start;
        let mut steps = 0usize;
        while index <= MAX_REG_SECT {
            steps += 1;
            if steps > self.mini_file_allocation_table.len() {
                Err(CfbError::SectorChainError(start))?;
            }
            let offset = index * MINI_SECTOR_SIZE;
            let sector = self
                .mini_stream
                .get(offset..self.mini_stream.len().min(offset + MINI_SECTOR_SIZE))
                .ok_or(CfbError::SectorRangeError(index))?;
            content.extend_from_slice(sector);
            index = *self
                .mini_file_allocation_table
                .get(index)
                .ok_or(CfbError::SectorRangeError(index))?;
        }
        Ok(content)
    }
}

/// CFB file header fields this reader relies on
struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_start: usize,
    mini_cutoff: usize,
    mini_file_allocation_table_start: usize,
    mini_file_allocation_table_count: usize,
    difat_start: usize,
    difat_count: usize,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, SheetJsonError> {
        if !is_cfb(data) {
            Err(CfbError::OleSignatureError)?;
        }
        let field = |offset: usize| usize_at(data, offset).ok_or(CfbError::FileFormatError);
        Ok(Header {
            major_version: u16_at(data, 26).ok_or(CfbError::FileFormatError)?,
            sector_shift: u16_at(data, 30).ok_or(CfbError::FileFormatError)?,
            file_allocation_table_count: field(44)?,
            directory_start: field(48)?,
            mini_cutoff: field(56)?,
            mini_file_allocation_table_start: field(60)?,
            mini_file_allocation_table_count: field(64)?,
            difat_start: field(68)?,
            difat_count: field(72)?,
        })
    }

    fn sector_size(&self) -> Result<usize, SheetJsonError> {
        match (self.major_version, self.sector_shift) {
            (3, 9) => Ok(512),
            // version 4 pads the header out to a full 4096-byte sector
            (4, 12) => Ok(4096),
            (major, shift) => Err(CfbError::SectorSizeError(major, shift))?,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum DirectoryKind {
    Storage,
    Stream,
    Root,
}

#[derive(Debug)]
struct Directory {
    name: String,
    kind: DirectoryKind,
    start: usize,
    size: usize,
}

impl Directory {
    /// Decodes one 128-byte entry; unused slots give `None`.
    fn new(bytes: &[u8], major_version: u16) -> Option<Directory> {
        let kind = match bytes[66] {
            1 => DirectoryKind::Storage,
            2 => DirectoryKind::Stream,
            5 => DirectoryKind::Root,
            _ => return None,
        };
        let length = (u16_at(bytes, 64)? as usize).min(64);
        let (name, _, _) = UTF_16LE.decode(&bytes[..length]);
        let name = match name.find('\0') {
            Some(position) => name[..position].to_owned(),
            None => name.into_owned(),
        };
        let start = usize_at(bytes, 116)?;
        let size = u64_at(bytes, 120)?;
        // version 3 files may leave garbage in the high half of the size
        let size = if major_version == 3 { size & 0xFFFF_FFFF } else { size };
        Some(Directory { name, kind, start, size: size as usize })
    }
}
