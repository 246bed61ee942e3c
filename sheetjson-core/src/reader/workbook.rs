//! Cell stream data structures

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single non-empty cell as read from a worksheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Excel-style reference (e.g., "A1")
    pub cell: String,
    /// Column letters (e.g., "A", "AB")
    pub column: String,
    /// 1-based row number
    pub row: u32,
    pub value: String,
}

impl Cell {
    /// Build a cell from its column letters and 1-based row
    pub fn new(column: impl Into<String>, row: u32, value: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            cell: format!("{}{}", column, row),
            column,
            row,
            value: value.into(),
        }
    }

    /// Parse an Excel-style reference such as "AB12"
    pub fn from_ref(cell_ref: &str, value: impl Into<String>) -> Option<Self> {
        let split = cell_ref.find(|c: char| c.is_ascii_digit())?;
        let (column, row) = cell_ref.split_at(split);
        if column.is_empty() || !column.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        let row = row.parse::<u32>().ok()?;
        Some(Self {
            cell: cell_ref.to_string(),
            column: column.to_string(),
            row,
            value: value.into(),
        })
    }

    /// 1-based column number
    pub fn column_index(&self) -> u32 {
        column_index(&self.column)
    }

    /// Row-major, column-ascending ordering used by the record builder
    pub fn position_cmp(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.column_index().cmp(&other.column_index()))
    }
}

/// Convert column letters to a 1-based column number ("A" -> 1, "AA" -> 27)
pub fn column_index(letters: &str) -> u32 {
    letters
        .bytes()
        .filter(|b| b.is_ascii_alphabetic())
        .fold(0u32, |acc, b| {
            acc.saturating_mul(26)
                .saturating_add((b.to_ascii_uppercase() - b'A') as u32 + 1)
        })
}

/// Convert a 1-based column number to letters (1 -> "A", 27 -> "AA")
pub fn column_letters(mut index: u32) -> String {
    let mut result = String::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        result.insert(0, (b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    result
}

/// All cells of one worksheet with its position in the workbook
#[derive(Debug, Clone, Default)]
pub struct SheetCells {
    /// 1-based position of the sheet in the workbook
    pub num: usize,
    /// Display name from workbook.xml
    pub name: String,
    pub cells: Vec<Cell>,
}

impl SheetCells {
    pub fn new(num: usize, name: impl Into<String>) -> Self {
        Self {
            num,
            name: name.into(),
            cells: Vec::new(),
        }
    }

    /// Whether the cells already satisfy the row-major contract
    pub fn is_row_major(&self) -> bool {
        is_row_major(&self.cells)
    }
}

/// Whether cells are sorted by row, then by column
pub fn is_row_major(cells: &[Cell]) -> bool {
    cells
        .windows(2)
        .all(|pair| pair[0].position_cmp(&pair[1]) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_conversion() {
        assert_eq!(column_index("A"), 1);
        assert_eq!(column_index("Z"), 26);
        assert_eq!(column_index("AA"), 27);
        assert_eq!(column_index("AB"), 28);
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(703), "AAA");
    }

    #[test]
    fn test_cell_from_ref() {
        let cell = Cell::from_ref("AB12", "x").unwrap();
        assert_eq!(cell.column, "AB");
        assert_eq!(cell.row, 12);
        assert_eq!(cell.cell, "AB12");
        assert!(Cell::from_ref("12", "x").is_none());
        assert!(Cell::from_ref("A", "x").is_none());
    }

    #[test]
    fn test_row_major_check() {
        let mut sheet = SheetCells::new(1, "Sheet1");
        sheet.cells = vec![Cell::new("B", 1, "b"), Cell::new("AA", 1, "aa"), Cell::new("A", 2, "a")];
        assert!(sheet.is_row_major());
        sheet.cells.swap(0, 1);
        assert!(!sheet.is_row_major());
        assert!(is_row_major(&sheet.cells[1..]));
    }
}
