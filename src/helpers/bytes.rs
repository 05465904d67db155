//! Little-endian readers over byte slices used by the binary workbook decoders.
//! Every accessor is bounds checked so a truncated file surfaces as `None`
//! instead of a panic.

/// Reads the `u16` stored at `offset`.
#[inline]
pub(crate) fn u16_at(bytes: &[u8], offset: usize) -> Option<u16> {
    let slice = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([slice[0], slice[1]]))
}

/// Reads the `u32` stored at `offset`.
#[inline]
pub(crate) fn u32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(slice.try_into().ok()?))
}

/// Reads the `u32` stored at `offset` widened to `usize`.
#[inline]
pub(crate) fn usize_at(bytes: &[u8], offset: usize) -> Option<usize> {
    u32_at(bytes, offset).map(|value| value as usize)
}

#[inline]
pub(crate) fn u64_at(bytes: &[u8], offset: usize) -> Option<u64> {
    let slice = bytes.get(offset..offset.checked_add(8)?)?;
    Some(u64::from_le_bytes(slice.try_into().ok()?))
}

/// Reads the IEEE 754 double stored at `offset`.
#[inline]
pub(crate) fn f64_at(bytes: &[u8], offset: usize) -> Option<f64> {
    u64_at(bytes, offset).map(f64::from_bits)
}

/// Splits a byte slice into `u32` sector identifiers, ignoring a short tail.
pub(crate) fn to_usize_iter(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_values() {
        let bytes = [0x34, 0x12, 0x78, 0x56, 0x00, 0x00];
        assert_eq!(u16_at(&bytes, 0), Some(0x1234));
        assert_eq!(u32_at(&bytes, 0), Some(0x5678_1234));
        assert_eq!(usize_at(&bytes, 2), Some(0x5678));
    }

    #[test]
    fn out_of_range_reads_return_none() {
        let bytes = [1u8, 2, 3];
        assert_eq!(u16_at(&bytes, 2), None);
        assert_eq!(u32_at(&bytes, 0), None);
        assert_eq!(f64_at(&bytes, 0), None);
        assert_eq!(u16_at(&bytes, usize::MAX), None);
    }

    #[test]
    fn doubles_and_identifier_lists() {
        let bytes = 1.5f64.to_le_bytes();
        assert_eq!(f64_at(&bytes, 0), Some(1.5));

        let ids: Vec<usize> = to_usize_iter(&[1, 0, 0, 0, 0xFE, 0xFF, 0xFF, 0xFF, 9]).collect();
        assert_eq!(ids, vec![1, 0xFFFF_FFFE]);
    }
}
