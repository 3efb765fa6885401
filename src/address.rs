//! A1-style cell addresses
//!
//! Columns use the bijective base-26 numeral system (A=1 … Z=26, AA=27 …),
//! rows are 1-based. Both directions are exact for every row, col ≥ 1.

use crate::error::{SheetfillError, SheetfillResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::warn;

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\$?([A-Z]+)\$?([0-9]+)$").expect("address pattern is a valid regex")
    })
}

/// Convert a (row, column) pair to an address string such as `AB1`.
///
/// Never fails: a non-positive row or column is coerced to 1 and a
/// diagnostic is logged, since this sits on the grid rendering path.
pub fn to_address(row: i64, col: i64) -> String {
    let row = coerce_index("row", row);
    let col = coerce_index("column", col);
    format!("{}{}", column_letters(col), row)
}

fn coerce_index(what: &str, value: i64) -> u32 {
    if value <= 0 || value > u32::MAX as i64 {
        warn!(value, "invalid {} index, using 1 instead", what);
        1
    } else {
        value as u32
    }
}

/// Column number to letters (1→A, 26→Z, 27→AA). Zero is treated as 1.
pub fn column_letters(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col.max(1);
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Split an address into its (row, column) indices.
pub fn to_indices(address: &str) -> SheetfillResult<(u32, u32)> {
    let caps = address_pattern()
        .captures(address.trim())
        .ok_or_else(|| SheetfillError::InvalidAddress(address.to_string()))?;

    let mut col: u32 = 0;
    for ch in caps[1].bytes() {
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add((ch - b'A' + 1) as u32))
            .ok_or_else(|| SheetfillError::InvalidAddress(address.to_string()))?;
    }

    let row: u32 = caps[2]
        .parse()
        .map_err(|_| SheetfillError::InvalidAddress(address.to_string()))?;
    if row == 0 {
        return Err(SheetfillError::InvalidAddress(address.to_string()));
    }

    Ok((row, col))
}

/// A validated cell position, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(row: u32, col: u32) -> Self {
        Self {
            row: row.max(1),
            col: col.max(1),
        }
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row)
    }
}

impl FromStr for CellAddress {
    type Err = SheetfillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (row, col) = to_indices(s)?;
        Ok(Self { row, col })
    }
}

/// Inclusive rectangle of cells, normalized so `start` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        Self {
            start: CellAddress::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellAddress::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn row_span(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn col_span(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    pub fn area(&self) -> u64 {
        self.row_span() as u64 * self.col_span() as u64
    }

    pub fn contains(&self, at: CellAddress) -> bool {
        (self.start.row..=self.end.row).contains(&at.row)
            && (self.start.col..=self.end.col).contains(&at.col)
    }

    /// Every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellAddress> + '_ {
        (self.start.row..=self.end.row).flat_map(move |row| {
            (self.start.col..=self.end.col).map(move |col| CellAddress { row, col })
        })
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

impl FromStr for CellRange {
    type Err = SheetfillError;

    /// Accepts `A1:B2` or a single `A1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((a, b)) => Ok(CellRange::new(a.parse()?, b.parse()?)),
            None => {
                let at: CellAddress = s.parse()?;
                Ok(CellRange::new(at, at))
            }
        }
    }
}
