//! Sheet formatter

use std::borrow::Cow;

use serde::Serialize;

use crate::builder::{RecordBuilder, SheetOutput};
use crate::error::FormatError;
use crate::options::SheetOptions;
use crate::reader::{Cell, SheetCells, is_row_major};
use crate::tree::Record;

/// A formatted sheet ready for linking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedSheet {
    pub num: usize,
    pub name: String,
    pub opts: SheetOptions,
    pub list: Vec<Record>,
}

impl FormattedSheet {
    pub fn new(num: usize, name: impl Into<String>, output: SheetOutput) -> Self {
        Self {
            num,
            name: name.into(),
            opts: output.opts,
            list: output.list,
        }
    }

    /// Collection this sheet contributes to
    pub fn collection_name(&self) -> &str {
        self.opts.collection_name(&self.name)
    }
}

/// Build the records of one sheet from its cell stream
///
/// Cells out of row-major order are stable-sorted into order first.
pub fn format_sheet(cells: &[Cell], opts: SheetOptions) -> Result<SheetOutput, FormatError> {
    let cells: Cow<'_, [Cell]> = if is_row_major(cells) {
        Cow::Borrowed(cells)
    } else {
        tracing::debug!("cell stream out of order, sorting");
        let mut sorted = cells.to_vec();
        sorted.sort_by(Cell::position_cmp);
        Cow::Owned(sorted)
    };

    let mut builder = RecordBuilder::new(opts);
    for cell in cells.iter() {
        builder.push_cell(cell)?;
    }
    let output = builder.finish();
    tracing::debug!(records = output.list.len(), "formatted sheet");
    Ok(output)
}

/// Format a sheet read from a workbook
pub fn format_sheet_cells(
    sheet: &SheetCells,
    opts: SheetOptions,
) -> Result<FormattedSheet, FormatError> {
    let _span = tracing::debug_span!("sheet", num = sheet.num, name = %sheet.name).entered();
    let output = format_sheet(&sheet.cells, opts)?;
    Ok(FormattedSheet::new(sheet.num, sheet.name.clone(), output))
}
