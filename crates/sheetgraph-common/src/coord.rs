//! Column-letter conversions and grid limits. All indices are 1-based, the way
//! they appear in A1 notation.

/// Last addressable row (Excel limit).
pub const MAX_ROW: u32 = 1_048_576;
/// Last addressable column, `XFD`.
pub const MAX_COL: u32 = 16_384;

/// `1 -> "A"`, `27 -> "AA"`. Column `0` renders as an empty string.
pub fn column_to_letters(col: u32) -> String {
    let mut buf = Vec::with_capacity(3);
    let mut n = col;
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        buf.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

/// Case-insensitive inverse of [`column_to_letters`]. Returns `None` for
/// non-letters or anything past [`MAX_COL`].
pub fn letters_to_column(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in s.bytes() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let val = (ch.to_ascii_uppercase() - b'A') as u32 + 1;
        col = col.checked_mul(26)?.checked_add(val)?;
        if col > MAX_COL {
            return None;
        }
    }
    Some(col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letter_roundtrip() {
        assert_eq!(column_to_letters(1), "A");
        assert_eq!(column_to_letters(26), "Z");
        assert_eq!(column_to_letters(27), "AA");
        assert_eq!(column_to_letters(MAX_COL), "XFD");
        assert_eq!(letters_to_column("ab"), Some(28));
        assert_eq!(letters_to_column("XFD"), Some(MAX_COL));
        assert_eq!(letters_to_column("XFE"), None);
        assert_eq!(letters_to_column("A1"), None);
    }

    #[test]
    fn zero_column_is_blank() {
        assert_eq!(column_to_letters(0), "");
        assert_eq!(letters_to_column(""), None);
    }
}
