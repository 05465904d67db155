use encoding_rs::Encoding;
use encoding_rs::UTF_8;
use std::borrow::Cow;
use tracing::warn;

/// Decodes text file bytes: a UTF-8 or UTF-16 byte order mark selects the
/// encoding and is stripped, anything else is read as UTF-8. Malformed
/// sequences become U+FFFD.
pub(crate) fn decode_text<'a>(file_name: &str, bytes: &'a [u8]) -> Cow<'a, str> {
    let (encoding, bom_length) = Encoding::for_bom(bytes).unwrap_or((UTF_8, 0));
    let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_length..]);
    if had_errors {
        warn!(file = file_name, encoding = encoding.name(), "replaced malformed byte sequences");
    }
    text
}
