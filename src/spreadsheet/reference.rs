//! A1-style cell references.

/// Converts 0-based row and column indexes to a reference like `B3`.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    let mut letters = Vec::new();
    let mut col = col + 1;
    while col > 0 {
        let remainder = (col - 1) % 26;
        letters.push((b'A' + remainder as u8) as char);
        col = (col - 1) / 26;
    }
    let column: String = letters.iter().rev().collect();
    format!("{}{}", column, row + 1)
}

/// Parses a reference like `B3` (or `$B$3`) into 0-based row and column indexes.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters
        .chars()
        .try_fold(0usize, |acc, c| {
            let value = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
            acc.checked_mul(26)?.checked_add(value)
        })?
        .checked_sub(1)?;
    let row = digits.parse::<usize>().ok()?.checked_sub(1)?;
    Some((row, col))
}
