//! Sheet-qualified A1 addresses.
//!
//! An [`Address`] is either a single cell or a rectangular span. Spans may be
//! unbounded in one dimension (`A:C`, `2:4`), which data sources later resolve to
//! the used extent of the sheet. Every address has a canonical string form that
//! the engine uses as its map key, and a total order ([`Address::sort_key`]) used
//! for deterministic serialization.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::coord::{MAX_COL, MAX_ROW, column_to_letters, letters_to_column};

/// Errors produced while parsing or resolving addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,
    #[error("invalid address '{0}'")]
    Invalid(String),
    #[error("unterminated sheet name in '{0}'")]
    UnterminatedSheet(String),
    #[error("range '{0}' is unbounded and cannot be enumerated")]
    Unbounded(String),
}

/// `(sheet, start_col, start_row, end_col, end_row)`; unbounded starts sort as 0
/// and unbounded ends as `u32::MAX`.
pub type SortKey<'a> = (&'a str, u32, u32, u32, u32);

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellAddress {
    /// Empty when the address was written without a sheet qualifier.
    pub sheet: String,
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(sheet: impl Into<String>, row: u32, col: u32) -> Self {
        Self {
            sheet: sheet.into(),
            row,
            col,
        }
    }

    pub fn has_sheet(&self) -> bool {
        !self.sheet.is_empty()
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = sheet.into();
        self
    }

    /// The sheet-less `A1` part.
    pub fn coordinate(&self) -> String {
        format!("{}{}", column_to_letters(self.col), self.row)
    }

    pub fn sort_key(&self) -> SortKey<'_> {
        (&self.sheet, self.col, self.row, self.col, self.row)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_prefix(f, &self.sheet)?;
        write!(f, "{}{}", column_to_letters(self.col), self.row)
    }
}

/// A rectangular span. `None` bounds mark whole-column (`A:C`) or whole-row
/// (`2:4`) ranges.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeAddress {
    pub sheet: String,
    pub start_row: Option<u32>,
    pub start_col: Option<u32>,
    pub end_row: Option<u32>,
    pub end_col: Option<u32>,
}

impl RangeAddress {
    /// Bounded range; corners are reordered so start is above/left of end.
    pub fn new(
        sheet: impl Into<String>,
        start_row: u32,
        start_col: u32,
        end_row: u32,
        end_col: u32,
    ) -> Self {
        Self {
            sheet: sheet.into(),
            start_row: Some(start_row.min(end_row)),
            start_col: Some(start_col.min(end_col)),
            end_row: Some(start_row.max(end_row)),
            end_col: Some(start_col.max(end_col)),
        }
    }

    pub fn columns(sheet: impl Into<String>, start_col: u32, end_col: u32) -> Self {
        Self {
            sheet: sheet.into(),
            start_row: None,
            start_col: Some(start_col.min(end_col)),
            end_row: None,
            end_col: Some(start_col.max(end_col)),
        }
    }

    pub fn rows(sheet: impl Into<String>, start_row: u32, end_row: u32) -> Self {
        Self {
            sheet: sheet.into(),
            start_row: Some(start_row.min(end_row)),
            start_col: None,
            end_row: Some(start_row.max(end_row)),
            end_col: None,
        }
    }

    pub fn has_sheet(&self) -> bool {
        !self.sheet.is_empty()
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = sheet.into();
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.start_row.is_some()
            && self.start_col.is_some()
            && self.end_row.is_some()
            && self.end_col.is_some()
    }

    fn bounds(&self) -> (u32, u32, u32, u32) {
        (
            self.start_row.unwrap_or(1),
            self.start_col.unwrap_or(1),
            self.end_row.unwrap_or(MAX_ROW),
            self.end_col.unwrap_or(MAX_COL),
        )
    }

    /// `(rows, cols)`; unbounded dimensions span the whole sheet.
    pub fn size(&self) -> (u32, u32) {
        let (sr, sc, er, ec) = self.bounds();
        (er - sr + 1, ec - sc + 1)
    }

    pub fn contains(&self, cell: &CellAddress) -> bool {
        let (sr, sc, er, ec) = self.bounds();
        self.sheet == cell.sheet
            && (sr..=er).contains(&cell.row)
            && (sc..=ec).contains(&cell.col)
    }

    pub fn start(&self) -> CellAddress {
        let (sr, sc, _, _) = self.bounds();
        CellAddress::new(self.sheet.clone(), sr, sc)
    }

    /// Clip unbounded dimensions to a used extent of `max_row` x `max_col`.
    /// Bounded dimensions are left alone.
    pub fn bounded_to(&self, max_row: u32, max_col: u32) -> RangeAddress {
        let (sr, sc, _, _) = self.bounds();
        let er = self.end_row.unwrap_or(max_row.max(sr));
        let ec = self.end_col.unwrap_or(max_col.max(sc));
        RangeAddress::new(self.sheet.clone(), sr, sc, er, ec)
    }

    /// Row-major matrix of member cells.
    pub fn resolve_range(&self) -> Result<Vec<Vec<CellAddress>>, AddressError> {
        if !self.is_bounded() {
            return Err(AddressError::Unbounded(self.to_string()));
        }
        let (sr, sc, er, ec) = self.bounds();
        Ok((sr..=er)
            .map(|row| {
                (sc..=ec)
                    .map(|col| CellAddress::new(self.sheet.clone(), row, col))
                    .collect()
            })
            .collect())
    }

    pub fn sort_key(&self) -> SortKey<'_> {
        (
            &self.sheet,
            self.start_col.unwrap_or(0),
            self.start_row.unwrap_or(0),
            self.end_col.unwrap_or(u32::MAX),
            self.end_row.unwrap_or(u32::MAX),
        )
    }
}

impl fmt::Display for RangeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_prefix(f, &self.sheet)?;
        let corner = |row: Option<u32>, col: Option<u32>| {
            let mut out = col.map(column_to_letters).unwrap_or_default();
            if let Some(row) = row {
                out.push_str(&row.to_string());
            }
            out
        };
        write!(
            f,
            "{}:{}",
            corner(self.start_row, self.start_col),
            corner(self.end_row, self.end_col)
        )
    }
}

/// A single cell or a rectangular span.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Cell(CellAddress),
    Range(RangeAddress),
}

impl Address {
    /// Parse an A1 reference such as `A1`, `$B$2`, `Sheet1!A1:C3`,
    /// `'My Sheet'!A:A` or `2:4`. A one-cell range collapses to a cell.
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AddressError::Empty);
        }
        let (sheet, body) = split_sheet(text)?;
        let invalid = || AddressError::Invalid(text.to_string());

        let (first, second) = match body.split_once(':') {
            Some((a, b)) => (a, Some(b)),
            None => (body, None),
        };
        let start = parse_corner(first).ok_or_else(invalid)?;
        let Some(second) = second else {
            return match start {
                (Some(row), Some(col)) => Ok(Address::Cell(CellAddress::new(sheet, row, col))),
                _ => Err(invalid()),
            };
        };
        let end = parse_corner(second).ok_or_else(invalid)?;

        match (start, end) {
            ((Some(r1), Some(c1)), (Some(r2), Some(c2))) => {
                if r1 == r2 && c1 == c2 {
                    Ok(Address::Cell(CellAddress::new(sheet, r1, c1)))
                } else {
                    Ok(Address::Range(RangeAddress::new(sheet, r1, c1, r2, c2)))
                }
            }
            ((None, Some(c1)), (None, Some(c2))) => {
                Ok(Address::Range(RangeAddress::columns(sheet, c1, c2)))
            }
            ((Some(r1), None), (Some(r2), None)) => {
                Ok(Address::Range(RangeAddress::rows(sheet, r1, r2)))
            }
            _ => Err(invalid()),
        }
    }

    /// Parse, then qualify with `sheet` if the text carried no sheet.
    pub fn parse_with_sheet(text: &str, sheet: &str) -> Result<Self, AddressError> {
        let addr = Self::parse(text)?;
        Ok(if addr.has_sheet() {
            addr
        } else {
            addr.with_sheet(sheet)
        })
    }

    pub fn sheet(&self) -> &str {
        match self {
            Address::Cell(c) => &c.sheet,
            Address::Range(r) => &r.sheet,
        }
    }

    pub fn has_sheet(&self) -> bool {
        !self.sheet().is_empty()
    }

    pub fn with_sheet(self, sheet: impl Into<String>) -> Self {
        match self {
            Address::Cell(c) => Address::Cell(c.with_sheet(sheet)),
            Address::Range(r) => Address::Range(r.with_sheet(sheet)),
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Address::Range(_))
    }

    /// True for cells and for ranges with all four bounds.
    pub fn is_bounded(&self) -> bool {
        match self {
            Address::Cell(_) => true,
            Address::Range(r) => r.is_bounded(),
        }
    }

    pub fn as_cell(&self) -> Option<&CellAddress> {
        match self {
            Address::Cell(c) => Some(c),
            Address::Range(_) => None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeAddress> {
        match self {
            Address::Range(r) => Some(r),
            Address::Cell(_) => None,
        }
    }

    pub fn sort_key(&self) -> SortKey<'_> {
        match self {
            Address::Cell(c) => c.sort_key(),
            Address::Range(r) => r.sort_key(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Cell(c) => c.fmt(f),
            Address::Range(r) => r.fmt(f),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<CellAddress> for Address {
    fn from(value: CellAddress) -> Self {
        Address::Cell(value)
    }
}

impl From<RangeAddress> for Address {
    fn from(value: RangeAddress) -> Self {
        Address::Range(value)
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.is_range().cmp(&other.is_range()))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sheet names made only of ASCII alphanumerics, `_` and `.` that do not start
/// with a digit are written bare; everything else is quoted.
pub fn needs_quoting(sheet: &str) -> bool {
    let mut chars = sheet.chars();
    match chars.next() {
        None => false,
        Some(first) if first.is_ascii_digit() => true,
        Some(_) => !sheet
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    }
}

fn write_sheet_prefix(f: &mut fmt::Formatter<'_>, sheet: &str) -> fmt::Result {
    if sheet.is_empty() {
        Ok(())
    } else if needs_quoting(sheet) {
        write!(f, "'{}'!", sheet.replace('\'', "''"))
    } else {
        write!(f, "{sheet}!")
    }
}

fn split_sheet(text: &str) -> Result<(String, &str), AddressError> {
    if let Some(rest) = text.strip_prefix('\'') {
        let bytes = rest.as_bytes();
        let mut name = String::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    name.push('\'');
                    i += 2;
                    continue;
                }
                let after = &rest[i + 1..];
                return match after.strip_prefix('!') {
                    Some(body) => Ok((name, body)),
                    None => Err(AddressError::Invalid(text.to_string())),
                };
            }
            let ch_len = rest[i..].chars().next().map_or(1, char::len_utf8);
            name.push_str(&rest[i..i + ch_len]);
            i += ch_len;
        }
        return Err(AddressError::UnterminatedSheet(text.to_string()));
    }
    match text.rsplit_once('!') {
        Some((sheet, body)) if !sheet.is_empty() => Ok((sheet.to_string(), body)),
        Some(_) => Err(AddressError::Invalid(text.to_string())),
        None => Ok((String::new(), text)),
    }
}

/// Parse `$A$1`, `A`, or `1` into `(row, col)`; missing parts are `None`.
fn parse_corner(s: &str) -> Option<(Option<u32>, Option<u32>)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if bytes.get(i) == Some(&b'$') {
        i += 1;
    }
    let col_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    let letters = &s[col_start..i];
    if !letters.is_empty() && bytes.get(i) == Some(&b'$') {
        i += 1;
    }
    let row_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i != bytes.len() {
        return None;
    }
    let digits = &s[row_start..i];

    let col = if letters.is_empty() {
        None
    } else {
        Some(letters_to_column(letters)?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        let row: u32 = digits.parse().ok()?;
        if row == 0 || row > MAX_ROW {
            return None;
        }
        Some(row)
    };
    if row.is_none() && col.is_none() {
        return None;
    }
    Some((row, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cells_and_ranges() {
        assert_eq!(
            Address::parse("Sheet1!$B$3").unwrap(),
            Address::Cell(CellAddress::new("Sheet1", 3, 2))
        );
        assert_eq!(
            Address::parse("c2:a1").unwrap(),
            Address::Range(RangeAddress::new("", 1, 1, 2, 3))
        );
        assert_eq!(
            Address::parse("'My Sheet'!A:B").unwrap(),
            Address::Range(RangeAddress::columns("My Sheet", 1, 2))
        );
        assert_eq!(
            Address::parse("Data!2:4").unwrap(),
            Address::Range(RangeAddress::rows("Data", 2, 4))
        );
    }

    #[test]
    fn single_cell_range_collapses() {
        let addr = Address::parse("Sheet1!B2:B2").unwrap();
        assert_eq!(addr.to_string(), "Sheet1!B2");
        assert!(!addr.is_range());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("A0").is_err());
        assert!(Address::parse("A1:B").is_err());
        assert!(Address::parse("1A").is_err());
        assert!(Address::parse("'Open!A1").is_err());
        assert!(Address::parse("!A1").is_err());
    }

    #[test]
    fn canonical_display_quotes_sheets() {
        let addr = Address::parse("'It''s here'!a1:b2").unwrap();
        assert_eq!(addr.to_string(), "'It''s here'!A1:B2");
        assert_eq!(Address::parse(&addr.to_string()).unwrap(), addr);
        assert_eq!(Address::parse("Sheet1!A:A").unwrap().to_string(), "Sheet1!A:A");
        assert_eq!(Address::parse("Sheet1!3:5").unwrap().to_string(), "Sheet1!3:5");
    }

    #[test]
    fn parse_with_sheet_keeps_explicit_sheet() {
        let a = Address::parse_with_sheet("A1", "Main").unwrap();
        assert_eq!(a.to_string(), "Main!A1");
        let b = Address::parse_with_sheet("Other!A1", "Main").unwrap();
        assert_eq!(b.to_string(), "Other!A1");
    }

    #[test]
    fn sort_key_orders_by_sheet_then_column_then_row() {
        let mut addrs: Vec<Address> = ["S!B1", "S!A2", "S!A1", "R!Z9", "S!A1:B2", "S!A:A"]
            .iter()
            .map(|s| Address::parse(s).unwrap())
            .collect();
        addrs.sort();
        let rendered: Vec<String> = addrs.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["R!Z9", "S!A:A", "S!A1", "S!A1:B2", "S!A2", "S!B1"]
        );
    }

    #[test]
    fn resolve_range_is_row_major() {
        let range = RangeAddress::new("S", 1, 1, 2, 2);
        let cells = range.resolve_range().unwrap();
        let names: Vec<Vec<String>> = cells
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();
        assert_eq!(names, vec![vec!["S!A1", "S!B1"], vec!["S!A2", "S!B2"]]);
        assert_eq!(range.size(), (2, 2));
        assert!(RangeAddress::columns("S", 1, 1).resolve_range().is_err());
    }

    #[test]
    fn bounded_to_clips_only_open_dimensions() {
        let cols = RangeAddress::columns("S", 1, 2).bounded_to(10, 50);
        assert_eq!(cols.to_string(), "S!A1:B10");
        let rows = RangeAddress::rows("S", 3, 4).bounded_to(10, 5);
        assert_eq!(rows.to_string(), "S!A3:E4");
        assert!(RangeAddress::columns("S", 1, 1).contains(&CellAddress::new("S", 999, 1)));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn display_parse_round_trip(row in 1u32..=MAX_ROW, col in 1u32..=MAX_COL, sheet in "[A-Za-z][A-Za-z0-9 ]{0,8}") {
                let addr = Address::Cell(CellAddress::new(sheet.clone(), row, col));
                let text = addr.to_string();
                prop_assert_eq!(Address::parse(&text).unwrap(), addr);
            }
        }
    }
}
