//! Attribute row compilation
//!
//! Each mapped column of the attribute row holds a dotted key path with an
//! optional `:type` suffix, e.g. `#items.#tags:number`. A segment prefixed
//! with `#` is a repeating group (an array of objects, or of scalars on the
//! final segment) and a final segment prefixed with `$` splits the cell on
//! `,` into an array.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::coerce::ValueType;
use crate::reader::Cell;

static TYPE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":([A-Za-z0-9_]+)$").unwrap());

/// Type tag marking a column that pins a repeating group's index
pub const INDEX_TYPE: &str = "index";

/// Compiled descriptor of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    #[serde(rename = "type")]
    pub type_tag: Option<String>,
    /// Dotted path, sigils included
    pub key: String,
    pub keys: Vec<String>,
}

/// One path segment with its sigils interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub name: &'a str,
    /// `#` prefix: repeating group
    pub repeated: bool,
    /// `$` prefix: comma-split array
    pub split: bool,
}

impl<'a> Segment<'a> {
    pub fn parse(raw: &'a str) -> Self {
        if let Some(name) = raw.strip_prefix('#') {
            Self {
                name,
                repeated: true,
                split: false,
            }
        } else if let Some(name) = raw.strip_prefix('$') {
            Self {
                name,
                repeated: false,
                split: true,
            }
        } else {
            Self {
                name: raw,
                repeated: false,
                split: false,
            }
        }
    }
}

impl Format {
    /// Parse attribute text such as `#array.num:number`
    pub fn parse(text: &str) -> Self {
        let (key, type_tag) = match TYPE_SUFFIX.captures(text) {
            Some(caps) => {
                let suffix = caps.get(0).map(|m| m.start()).unwrap_or(text.len());
                (&text[..suffix], caps.get(1).map(|m| m.as_str().to_string()))
            }
            None => (text, None),
        };
        Self {
            type_tag,
            key: key.to_string(),
            keys: key.split('.').map(str::to_string).collect(),
        }
    }

    /// Whether this column pins a repeating group index
    pub fn is_index(&self) -> bool {
        self.type_tag
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(INDEX_TYPE))
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.type_tag.as_deref().and_then(ValueType::from_tag)
    }

    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        self.keys.iter().map(|k| Segment::parse(k))
    }

    /// Index-state key of the path prefix ending at segment `i`
    pub fn prefix(&self, i: usize) -> String {
        self.keys[..=i].join(".")
    }
}

/// Compile the attribute row of a sheet into per-column formats
pub fn compile_header(cells: &[Cell], attr_line: u32) -> IndexMap<String, Format> {
    cells
        .iter()
        .filter(|c| c.row == attr_line)
        .map(|c| (c.column.clone(), Format::parse(&c.value)))
        .collect()
}
