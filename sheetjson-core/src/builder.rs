//! Record builder: interprets a sheet's cell stream into records
//!
//! Cells must be fed in row-major, column-ascending order. The builder keeps
//! the sheet options (overlaid by the option cell and extended by the
//! attribute row as they stream past), the repeating group index state and
//! the records built so far.

use serde_json::Value;

use crate::coerce;
use crate::error::FormatError;
use crate::header::Format;
use crate::index::IndexState;
use crate::options::SheetOptions;
use crate::reader::Cell;
use crate::tree::{self, Record};

/// Leaf name that starts a record in `array`/`map` sheets and names its origin
pub const REF_FIELD: &str = "__ref";
/// Leaf name holding the index path used for linking
pub const IN_FIELD: &str = "__in";
/// Leaf name holding the map key for `map` sheets
pub const KEY_FIELD: &str = "__key";

/// Result of formatting one sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetOutput {
    pub opts: SheetOptions,
    pub list: Vec<Record>,
}

pub struct RecordBuilder {
    opts: SheetOptions,
    index: IndexState,
    list: Vec<Record>,
    before_row: Option<u32>,
}

impl RecordBuilder {
    pub fn new(opts: SheetOptions) -> Self {
        Self {
            opts,
            index: IndexState::new(),
            list: Vec::new(),
            before_row: None,
        }
    }

    /// Interpret one cell
    pub fn push_cell(&mut self, cell: &Cell) -> Result<(), FormatError> {
        if self.before_row != Some(cell.row) {
            self.index.advance_row();
            self.before_row = Some(cell.row);
        }

        if cell.cell == self.opts.option_cell {
            return self
                .opts
                .apply_option_cell(&cell.value)
                .map_err(|source| FormatError::InvalidOptionCell {
                    cell: cell.cell.clone(),
                    source,
                });
        }

        if cell.row == self.opts.attr_line {
            self.opts
                .format
                .insert(cell.column.clone(), Format::parse(&cell.value));
            return Ok(());
        }

        if cell.row < self.opts.data_line {
            return Ok(());
        }
        let Some(format) = self.opts.format.get(&cell.column) else {
            return Ok(());
        };

        if format.is_index() {
            match parse_index(&cell.value) {
                Some(value) => {
                    if self.index.pin(&format.key, value) {
                        tracing::trace!(cell = %cell.cell, path = %format.key, value, "pinned index");
                    }
                }
                None => {
                    tracing::warn!(cell = %cell.cell, value = %cell.value, "skipping unparseable index cell");
                }
            }
            return Ok(());
        }

        if format.key == self.opts.ref_key || format.key == REF_FIELD {
            self.index.clear();
            self.list.push(Record::new());
        }

        let Some(record) = self.list.last_mut() else {
            return Err(FormatError::MissingOrigin {
                cell: cell.cell.clone(),
            });
        };

        match write_cell(record, &mut self.index, format, &cell.value) {
            Some(true) => {}
            Some(false) => {
                tracing::trace!(cell = %cell.cell, path = %format.key, "slot already filled");
            }
            None => {
                tracing::warn!(cell = %cell.cell, path = %format.key, "path conflicts with an existing value");
            }
        }
        Ok(())
    }

    pub fn finish(self) -> SheetOutput {
        SheetOutput {
            opts: self.opts,
            list: self.list,
        }
    }
}

/// Leading integer of an index cell, like a base-10 `parseInt`
fn parse_index(raw: &str) -> Option<usize> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value = digits[..end].parse::<usize>().ok()?;
    if negative && value != 0 {
        return None;
    }
    Some(value)
}

/// Write one data cell into `record` along the column's key path
///
/// Returns `Some(false)` when the target slot already holds a value and
/// `None` when the path runs into a value of the wrong shape.
fn write_cell(
    record: &mut Record,
    index: &mut IndexState,
    format: &Format,
    raw: &str,
) -> Option<bool> {
    let segments: Vec<_> = format.segments().collect();
    let (last, parents) = segments.split_last()?;

    let mut node = record;
    for (i, segment) in parents.iter().enumerate() {
        if segment.repeated {
            let array = tree::array_at(node, segment.name)?;
            let position = index.resolve(&format.prefix(i), array.len());
            node = tree::element_object(array, position)?;
        } else {
            node = tree::object_at(node, segment.name)?;
        }
    }

    let value_type = format.value_type();
    let value = || -> Value { coerce::coerce(value_type, raw, last.split) };
    if last.repeated {
        let array = tree::array_at(node, last.name)?;
        let position = index.resolve(&format.key, array.len());
        Some(tree::fill_element(array, position, value))
    } else {
        Some(tree::fill_field(node, last.name, value))
    }
}
