//! Configuration system for the converter

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use crate::options::SheetOptions;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "sheetjson.toml";

static CELL_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]+[1-9][0-9]*$").unwrap());

/// Main converter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Cell holding the per-sheet option JSON
    pub option_cell: String,
    /// Row holding the column attributes
    pub attr_line: u32,
    /// First data row
    pub data_line: u32,
    /// Field that starts an origin record
    pub ref_key: String,
    /// 1-based sheet numbers to convert (empty means all)
    pub sheets: Vec<usize>,
    /// Defaults for individual sheets by display name
    #[serde(rename = "sheet")]
    pub overrides: HashMap<String, SheetDefaults>,
}

/// Sheet-specific defaults, applied before the option cell is read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetDefaults {
    pub attr_line: Option<u32>,
    pub data_line: Option<u32>,
    pub ref_key: Option<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        let opts = SheetOptions::default();
        Self {
            option_cell: opts.option_cell,
            attr_line: opts.attr_line,
            data_line: opts.data_line,
            ref_key: opts.ref_key,
            sheets: Vec::new(),
            overrides: HashMap::new(),
        }
    }
}

impl ConverterConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ConverterConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `sheetjson.toml` from `dir` when present, else the defaults
    pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let candidate = dir.as_ref().join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "loading configuration");
            Self::from_file(candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the layout settings, globally and per sheet
    pub fn validate(&self) -> Result<()> {
        if !CELL_REFERENCE.is_match(&self.option_cell) {
            anyhow::bail!(
                "Configuration error: option_cell '{}' is not a cell reference",
                self.option_cell
            );
        }
        check_layout("global", self.attr_line, self.data_line, &self.ref_key)?;

        for (sheet_name, defaults) in &self.overrides {
            let attr_line = defaults.attr_line.unwrap_or(self.attr_line);
            let data_line = defaults.data_line.unwrap_or(self.data_line);
            let ref_key = defaults.ref_key.as_deref().unwrap_or(&self.ref_key);
            check_layout(&format!("sheet '{}'", sheet_name), attr_line, data_line, ref_key)?;
        }

        if let Some(zero) = self.sheets.iter().find(|&&n| n == 0) {
            anyhow::bail!("Configuration error: sheet number {} is not 1-based", zero);
        }

        Ok(())
    }

    /// Initial options for a sheet: sheet defaults, then global settings
    pub fn sheet_options(&self, sheet_name: &str) -> SheetOptions {
        let defaults = self.overrides.get(sheet_name);
        SheetOptions {
            option_cell: self.option_cell.clone(),
            attr_line: defaults
                .and_then(|d| d.attr_line)
                .unwrap_or(self.attr_line),
            data_line: defaults
                .and_then(|d| d.data_line)
                .unwrap_or(self.data_line),
            ref_key: defaults
                .and_then(|d| d.ref_key.clone())
                .unwrap_or_else(|| self.ref_key.clone()),
            ..SheetOptions::default()
        }
    }
}

fn check_layout(scope: &str, attr_line: u32, data_line: u32, ref_key: &str) -> Result<()> {
    if ref_key.is_empty() {
        anyhow::bail!("Configuration error: empty ref_key in {}", scope);
    }
    if attr_line == 0 {
        anyhow::bail!("Configuration error: attr_line must be 1-based in {}", scope);
    }
    if data_line <= attr_line {
        anyhow::bail!(
            "Configuration error: data_line {} must come after attr_line {} in {}",
            data_line,
            attr_line,
            scope
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_sheet_options() {
        let config = ConverterConfig::default();
        assert_eq!(config.sheet_options("Sheet1"), SheetOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: ConverterConfig = toml::from_str(
            r#"
            data_line = 5
            sheets = [1, 3]

            [sheet.Items]
            attr_line = 3
            ref_key = "id"
            "#,
        )
        .unwrap();
        assert_eq!(config.option_cell, "A1");
        assert_eq!(config.data_line, 5);
        assert_eq!(config.sheets, vec![1, 3]);

        let items = config.sheet_options("Items");
        assert_eq!(items.attr_line, 3);
        assert_eq!(items.data_line, 5);
        assert_eq!(items.ref_key, "id");

        let other = config.sheet_options("Other");
        assert_eq!(other.attr_line, 2);
        assert_eq!(other.ref_key, "_id");
    }

    #[test]
    fn test_validation() {
        let config = ConverterConfig::default();
        assert!(config.validate().is_ok());

        let mut bad_config = config.clone();
        bad_config.option_cell = "a1".to_string();
        assert!(bad_config.validate().is_err());

        let mut bad_config = config.clone();
        bad_config.option_cell = "A0".to_string();
        assert!(bad_config.validate().is_err());

        let mut bad_config = config.clone();
        bad_config.ref_key = String::new();
        assert!(bad_config.validate().is_err());

        let mut bad_config = config.clone();
        bad_config.attr_line = 0;
        assert!(bad_config.validate().is_err());

        let mut bad_config = config.clone();
        bad_config.data_line = 2;
        assert!(bad_config.validate().is_err());

        let mut bad_config = config.clone();
        bad_config.sheets = vec![0];
        assert!(bad_config.validate().is_err());

        // Invalid sheet override
        let mut bad_config = config.clone();
        bad_config.overrides.insert(
            "Sheet1".to_string(),
            SheetDefaults {
                data_line: Some(1),
                ..SheetDefaults::default()
            },
        );
        let err = bad_config.validate().unwrap_err();
        assert!(err.to_string().contains("sheet 'Sheet1'"));
    }

    #[test]
    fn test_discover_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ConverterConfig::discover(dir.path()).unwrap(), ConverterConfig::default());

        fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "ref_key = \"key\"\n").unwrap();
        assert_eq!(ConverterConfig::discover(dir.path()).unwrap().ref_key, "key");
    }
}
