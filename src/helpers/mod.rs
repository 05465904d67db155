//! Low-level readers shared by the workbook decoders.

pub(crate) mod biff8;
pub(crate) mod bytes;
pub(crate) mod cfb;
pub(crate) mod text;
pub(crate) mod xml;
pub(crate) mod zip;
