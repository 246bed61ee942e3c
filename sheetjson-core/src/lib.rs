//! sheetjson: Core library for spreadsheet to JSON conversion
//!
//! Sheets describe their own layout: an option cell holding JSON, an
//! attribute row of dotted key paths and data rows below it. Each sheet is
//! formatted into records, then all sheets are linked into named
//! collections.

pub mod builder;
pub mod coerce;
pub mod config;
pub mod error;
pub mod header;
pub mod index;
pub mod linker;
pub mod options;
pub mod reader;
pub mod report;
pub mod sheet;
pub mod tree;

use anyhow::Result;
use rayon::prelude::*;
use std::path::Path;

pub use builder::{RecordBuilder, SheetOutput};
pub use config::ConverterConfig;
pub use error::{FormatError, LinkError};
pub use linker::link_collections;
pub use options::{SheetKind, SheetOptions};
pub use reader::{Cell, SheetCells};
pub use report::{Collection, CollectionMap, Conversion, FormatReport, LinkReport, SheetFailure, UnresolvedLink};
pub use sheet::{FormattedSheet, format_sheet};
pub use tree::Record;

/// Main converter interface
pub struct Converter {
    config: ConverterConfig,
}

impl Converter {
    /// Create a new converter with default configuration
    pub fn new() -> Self {
        Self::with_config(ConverterConfig::default())
    }

    /// Create a new converter with custom configuration
    pub fn with_config(config: ConverterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Format every sheet independently, keeping workbook order
    pub fn format_sheets(&self, sheets: Vec<SheetCells>) -> FormatReport {
        let outcomes: Vec<_> = sheets
            .into_par_iter()
            .map(|sheet| {
                let opts = self.config.sheet_options(&sheet.name);
                sheet::format_sheet_cells(&sheet, opts).map_err(|error| {
                    tracing::warn!(num = sheet.num, name = %sheet.name, %error, "invalid sheet format");
                    SheetFailure::new(sheet.num, sheet.name.clone(), error)
                })
            })
            .collect();

        let mut report = FormatReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(sheet) => report.sheets.push(sheet),
                Err(failure) => report.failures.push(failure),
            }
        }
        report
    }

    /// Read and format the configured sheets of a workbook
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<FormatReport> {
        let sheets = reader::read_workbook(path, &self.config.sheets)?;
        Ok(self.format_sheets(sheets))
    }

    /// Link formatted sheets into collections
    pub fn to_json(&self, sheets: Vec<FormattedSheet>) -> LinkReport {
        link_collections(sheets)
    }

    /// Read, format and link a workbook
    pub fn convert_file<P: AsRef<Path>>(&self, path: P) -> Result<Conversion> {
        let FormatReport { sheets, failures } = self.parse_file(path)?;
        let link = self.to_json(sheets);
        Ok(Conversion { link, failures })
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sheet(num: usize, name: &str, rows: &[(u32, &[(&str, &str)])]) -> SheetCells {
        let mut sheet = SheetCells::new(num, name);
        for (row, cells) in rows {
            for (column, value) in cells.iter() {
                sheet.cells.push(Cell::new(*column, *row, *value));
            }
        }
        sheet
    }

    #[test]
    fn test_format_sheets_keeps_order_and_failures() {
        let sheets = vec![
            sheet(1, "A", &[(2, &[("A", "_id")]), (4, &[("A", "a1")])]),
            sheet(2, "Broken", &[(1, &[("A", "{")])]),
            sheet(3, "C", &[(2, &[("A", "_id")]), (4, &[("A", "c1")])]),
        ];
        let report = Converter::new().format_sheets(sheets);
        assert!(!report.is_clean());
        assert_eq!(
            report.sheets.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["A", "C"]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].num, 2);
    }

    #[test]
    fn test_config_defaults_apply_per_sheet() {
        let mut config = ConverterConfig::default();
        config.overrides.insert(
            "Items".to_string(),
            config::SheetDefaults {
                data_line: Some(3),
                ref_key: Some("code".to_string()),
                ..Default::default()
            },
        );
        let converter = Converter::with_config(config);
        let sheets = vec![sheet(1, "Items", &[(2, &[("A", "code")]), (3, &[("A", "x")])])];
        let formatted = converter.format_sheets(sheets);
        let linked = converter.to_json(formatted.sheets);
        assert_eq!(
            serde_json::to_value(&linked.collections).unwrap(),
            json!({ "Items": { "x": { "code": "x" } } })
        );
    }
}
