//! Excel cell stream reader using custom XML parsers

use anyhow::{Context, Result};

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;

pub mod workbook;
pub mod xlsx_parser;

use self::xlsx_parser::XlsxReader;
pub use workbook::{Cell, SheetCells, column_index, column_letters, is_row_major};

/// Trait for providers of per-sheet cell streams
///
/// Implementations must yield each sheet's cells in row-major,
/// column-ascending order with empty cells omitted.
pub trait WorkbookReader {
    /// Display names of all sheets, in workbook order
    fn sheet_names(&self) -> Vec<String>;
    /// Read the selected 1-based sheets (all sheets when empty)
    fn read_sheets(&mut self, selection: &[usize]) -> Result<Vec<SheetCells>>;
}

/// Read the cell streams of a workbook from a file path
pub fn read_workbook<P: AsRef<Path>>(path: P, selection: &[usize]) -> Result<Vec<SheetCells>> {
    let path_ref = path.as_ref();

    let is_xlsx = path_ref
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("xlsx") || s.eq_ignore_ascii_case("xlsm"))
        .unwrap_or(false);
    if !is_xlsx {
        return Err(anyhow::anyhow!(
            "Unsupported file format: {}",
            path_ref.display()
        ));
    }

    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open file: {}", path_ref.display()))?;
    read_workbook_from(file, selection)
}

/// Read the cell streams of an in-memory or already opened XLSX package
pub fn read_workbook_from<R: Read + Seek>(reader: R, selection: &[usize]) -> Result<Vec<SheetCells>> {
    let mut archive = ZipArchive::new(reader).context("Failed to open zip archive")?;
    let mut xlsx = XlsxReader::new(&mut archive)?;
    tracing::debug!(names = ?xlsx.sheet_names(), "workbook sheets");
    let sheets = xlsx.read_sheets(selection)?;
    tracing::info!(sheets = sheets.len(), "read workbook");
    Ok(sheets)
}
