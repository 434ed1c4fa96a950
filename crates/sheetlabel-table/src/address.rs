//! Cell address and range types

use std::fmt;

/// A cell address (e.g., "A1")
///
/// Rows and columns are 0-based internally and rendered 1-based / lettered
/// in A1 notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    /// Row index (0-based internally, 1-based in display)
    pub row: u32,
    /// Column index (0-based, A=0, B=1, ..., XFD=16383)
    pub col: u16,
}

impl CellAddress {
    /// Create a new cell address
    pub fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    /// Convert column index to letters (0 = A, 25 = Z, 26 = AA, etc.)
    pub fn column_to_letters(col: u16) -> String {
        let mut result = String::new();
        let mut n = col as u32 + 1; // 1-based for calculation

        while n > 0 {
            n -= 1;
            let c = ((n % 26) as u8 + b'A') as char;
            result.insert(0, c);
            n /= 26;
        }

        result
    }

    /// Convert to A1-style notation
    pub fn to_a1_string(&self) -> String {
        format!("{}{}", Self::column_to_letters(self.col), self.row + 1)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

/// A rectangular range of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    /// Create a new range, normalizing so `start` is the top-left corner
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        Self {
            start: CellAddress::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellAddress::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    /// Convert to A1-style notation ("A1" for a single cell, "A1:C3" otherwise)
    pub fn to_a1_string(&self) -> String {
        if self.start == self.end {
            self.start.to_a1_string()
        } else {
            format!("{}:{}", self.start.to_a1_string(), self.end.to_a1_string())
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}
