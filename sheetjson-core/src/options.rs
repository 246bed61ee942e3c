//! Per-sheet options and the option cell overlay

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::header::Format;

/// How a sheet's records join their collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetKind {
    /// Records are origin records keyed by `ref_key`
    #[default]
    Origin,
    /// Records are appended to an array inside an origin record
    Array,
    /// Records are stored under `__key` in an object inside an origin record
    Map,
}

/// Options for formatting one sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetOptions {
    pub option_cell: String,
    pub attr_line: u32,
    pub data_line: u32,
    pub ref_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SheetKind>,
    /// Dotted path inside the origin record for `array`/`map` sheets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub format: IndexMap<String, Format>,
    /// Unrecognised option cell keys, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SheetOptions {
    fn default() -> Self {
        Self {
            option_cell: "A1".to_string(),
            attr_line: 2,
            data_line: 4,
            ref_key: "_id".to_string(),
            name: None,
            kind: None,
            key: None,
            format: IndexMap::new(),
            extra: Map::new(),
        }
    }
}

/// Keys an option cell may set
#[derive(Debug, Deserialize)]
struct OptionCell {
    attr_line: Option<u32>,
    data_line: Option<u32>,
    ref_key: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<SheetKind>,
    key: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl SheetOptions {
    /// Overlay the JSON object stored in the option cell
    ///
    /// A JSON value other than an object leaves the options untouched.
    pub fn apply_option_cell(&mut self, raw: &str) -> Result<(), serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            tracing::debug!(%raw, "option cell is not an object, ignoring");
            return Ok(());
        }
        let overlay: OptionCell = serde_json::from_value(value)?;

        if let Some(attr_line) = overlay.attr_line {
            self.attr_line = attr_line;
        }
        if let Some(data_line) = overlay.data_line {
            self.data_line = data_line;
        }
        if let Some(ref_key) = overlay.ref_key {
            self.ref_key = ref_key;
        }
        if overlay.name.is_some() {
            self.name = overlay.name;
        }
        if overlay.kind.is_some() {
            self.kind = overlay.kind;
        }
        if overlay.key.is_some() {
            self.key = overlay.key;
        }
        for (k, v) in overlay.extra {
            // The option cell location and column formats are not overridable
            if k == "option_cell" || k == "format" {
                continue;
            }
            self.extra.insert(k, v);
        }
        Ok(())
    }

    pub fn kind(&self) -> SheetKind {
        self.kind.unwrap_or_default()
    }

    /// Collection this sheet contributes to
    pub fn collection_name<'a>(&'a self, sheet_name: &'a str) -> &'a str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => sheet_name,
        }
    }

    /// Fold a later sheet's options into these canonical ones
    ///
    /// Fields set here are kept; unset fields are taken from `later`, and
    /// `later`'s column formats overwrite same-column entries.
    pub fn merge_from(&mut self, later: &SheetOptions) {
        if self.name.is_none() {
            self.name = later.name.clone();
        }
        if self.kind.is_none() {
            self.kind = later.kind;
        }
        if self.key.is_none() {
            self.key = later.key.clone();
        }
        for (k, v) in &later.extra {
            if !self.extra.contains_key(k) {
                self.extra.insert(k.clone(), v.clone());
            }
        }
        for (column, format) in &later.format {
            self.format.insert(column.clone(), format.clone());
        }
    }
}
