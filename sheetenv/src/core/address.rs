//! Sheet, cell and range address resolution.
//!
//! Cell references use A1 notation (`B3`, `AA10`, optionally `$`-anchored);
//! ranges are `A1:C2` or a single cell. Coordinates are zero-indexed.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::EnvError;

static A1: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$?(?<letters>[A-Za-z]{1,3})\$?(?<numbers>[0-9]{1,7})$").expect("valid A1 regex")
});

/// A single cell, ordered row-major so maps iterate in reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddr {
    pub row: usize,
    pub col: usize,
}

impl CellAddr {
    pub fn new(col: usize, row: usize) -> Self {
        Self { row, col }
    }

    /// Parse `A1`-style notation. Returns `None` if the input is not a single cell.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = A1.captures(name.trim())?;
        let mut col_acc = 0usize;
        for c in caps["letters"].to_ascii_uppercase().bytes() {
            col_acc = col_acc * 26 + (c - b'A') as usize + 1;
        }
        let row = caps["numbers"].parse::<usize>().ok()?.checked_sub(1)?;
        Some(Self::new(col_acc - 1, row))
    }

    /// Column index to letters (0 -> A, 25 -> Z, 26 -> AA).
    pub fn col_letters(col: usize) -> String {
        let mut result = String::new();
        let mut n = col + 1;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        result
    }
}

impl fmt::Display for CellAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::col_letters(self.col), self.row + 1)
    }
}

/// A rectangular block of cells; `start` is always the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeAddr {
    pub start: CellAddr,
    pub end: CellAddr,
}

impl RangeAddr {
    pub fn single(cell: CellAddr) -> Self {
        Self {
            start: cell,
            end: cell,
        }
    }

    /// Parse `A1:C2` or a single cell. Corners may be given in any order.
    pub fn parse(name: &str) -> Option<Self> {
        let (a, b) = match name.split_once(':') {
            Some((a, b)) => (CellAddr::parse(a)?, CellAddr::parse(b)?),
            None => {
                let cell = CellAddr::parse(name)?;
                (cell, cell)
            }
        };
        Some(Self {
            start: CellAddr::new(a.col.min(b.col), a.row.min(b.row)),
            end: CellAddr::new(a.col.max(b.col), a.row.max(b.row)),
        })
    }

    pub fn rows(&self) -> usize {
        self.end.row - self.start.row + 1
    }

    pub fn cols(&self) -> usize {
        self.end.col - self.start.col + 1
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellAddr> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |row| (self.start.col..=self.end.col).map(move |col| CellAddr::new(col, row)))
    }
}

impl fmt::Display for RangeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Parse a cell reference or fail with an address error naming it.
pub fn parse_cell(reference: &str) -> Result<CellAddr, EnvError> {
    CellAddr::parse(reference)
        .ok_or_else(|| EnvError::Address(format!("invalid cell reference '{reference}'")))
}

/// Parse a range reference or fail with an address error naming it.
pub fn parse_range(reference: &str) -> Result<RangeAddr, EnvError> {
    RangeAddr::parse(reference)
        .ok_or_else(|| EnvError::Address(format!("invalid range reference '{reference}'")))
}

/// Pick the sheet a command operates on.
///
/// A requested sheet that exists wins. A requested sheet that does not exist
/// silently falls back to `current`, as does no request at all.
pub fn resolve_sheet<'a>(requested: Option<&'a str>, sheet_names: &[String], current: &'a str) -> &'a str {
    match requested {
        Some(name) if sheet_names.iter().any(|existing| existing == name) => name,
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cell_handles_letters_and_anchors() {
        assert_eq!(CellAddr::parse("A1"), Some(CellAddr::new(0, 0)));
        assert_eq!(CellAddr::parse("b3"), Some(CellAddr::new(1, 2)));
        assert_eq!(CellAddr::parse("$AA$10"), Some(CellAddr::new(26, 9)));
        assert_eq!(CellAddr::parse("A0"), None);
        assert_eq!(CellAddr::parse("A1:B2"), None);
        assert_eq!(CellAddr::parse("Sheet1"), None);
    }

    #[test]
    fn col_letters_round_trip_through_display() {
        for col in [0, 25, 26, 701, 702] {
            let cell = CellAddr::new(col, 4);
            assert_eq!(CellAddr::parse(&cell.to_string()), Some(cell));
        }
        assert_eq!(CellAddr::col_letters(27), "AB");
    }

    #[test]
    fn range_normalizes_corners() {
        let range = RangeAddr::parse("C2:A1").expect("range");
        assert_eq!(range.start, CellAddr::new(0, 0));
        assert_eq!(range.end, CellAddr::new(2, 1));
        assert_eq!((range.rows(), range.cols()), (2, 3));
        assert_eq!(range.to_string(), "A1:C2");
        assert_eq!(range.cells().count(), 6);
    }

    #[test]
    fn invalid_references_are_address_errors() {
        assert!(matches!(parse_cell("nope"), Err(EnvError::Address(_))));
        assert!(matches!(parse_range("A1:"), Err(EnvError::Address(_))));
    }

    #[test]
    fn unknown_sheet_falls_back_to_current() {
        let names = vec!["Sheet1".to_string(), "Data".to_string()];
        assert_eq!(resolve_sheet(Some("Data"), &names, "Sheet1"), "Data");
        assert_eq!(resolve_sheet(Some("Missing"), &names, "Sheet1"), "Sheet1");
        assert_eq!(resolve_sheet(None, &names, "Data"), "Data");
    }
}
