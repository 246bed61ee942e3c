//! Batch outcome reporting for formatting and linking

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt::Display;

use crate::error::{FormatError, LinkError};
use crate::options::SheetOptions;
use crate::sheet::FormattedSheet;
use crate::tree::Record;

/// Records of one collection keyed by reference key value
pub type Collection = IndexMap<String, Value>;

/// All linked collections keyed by collection name
pub type CollectionMap = IndexMap<String, Collection>;

fn serialize_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// A sheet that could not be formatted
#[derive(Debug, Serialize)]
pub struct SheetFailure {
    pub num: usize,
    pub name: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: FormatError,
}

impl SheetFailure {
    pub fn new(num: usize, name: impl Into<String>, error: FormatError) -> Self {
        Self {
            num,
            name: name.into(),
            error,
        }
    }
}

/// A record that could not be traced to its origin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedLink {
    /// Display name of the sheet the record came from
    pub sheet: String,
    #[serde(serialize_with = "serialize_display")]
    pub reason: LinkError,
    /// The record as formatted, bookkeeping fields included
    pub record: Record,
}

impl UnresolvedLink {
    pub fn new(sheet: impl Into<String>, reason: LinkError, record: Record) -> Self {
        Self {
            sheet: sheet.into(),
            reason,
            record,
        }
    }
}

/// Outcome of formatting the sheets of a workbook
#[derive(Debug, Default)]
pub struct FormatReport {
    /// Formatted sheets in workbook order
    pub sheets: Vec<FormattedSheet>,
    pub failures: Vec<SheetFailure>,
}

impl FormatReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of linking formatted sheets into collections
#[derive(Debug, Default, Serialize)]
pub struct LinkReport {
    pub collections: CollectionMap,
    /// Canonical options per collection name
    pub options: IndexMap<String, SheetOptions>,
    /// Unresolved records per collection name
    pub errors: IndexMap<String, Vec<UnresolvedLink>>,
}

impl LinkReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn unresolved_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub(crate) fn push_error(&mut self, collection: &str, link: UnresolvedLink) {
        tracing::warn!(collection, sheet = %link.sheet, reason = %link.reason, "unresolved link");
        self.errors
            .entry(collection.to_string())
            .or_default()
            .push(link);
    }
}

/// Full result of converting one workbook
#[derive(Debug)]
pub struct Conversion {
    pub link: LinkReport,
    pub failures: Vec<SheetFailure>,
}

impl Conversion {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.link.is_clean()
    }

    pub fn collections(&self) -> &CollectionMap {
        &self.link.collections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unresolved_link_serializes_reason_text() {
        let mut record = Record::new();
        record.insert("__ref".to_string(), json!("zzz"));
        let link = UnresolvedLink::new("Sheet2", LinkError::OriginNotFound, record);
        assert_eq!(
            serde_json::to_value(&link).unwrap(),
            json!({ "sheet": "Sheet2", "reason": "not found origin", "record": { "__ref": "zzz" } })
        );
    }

    #[test]
    fn test_link_report_counts() {
        let mut report = LinkReport::default();
        assert!(report.is_clean());
        report.push_error("Items", UnresolvedLink::new("S", LinkError::MissingMapKey, Record::new()));
        report.push_error("Items", UnresolvedLink::new("S", LinkError::NotAnArray, Record::new()));
        assert!(!report.is_clean());
        assert_eq!(report.unresolved_count(), 2);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_sheet_failure_serializes_message() {
        let failure = SheetFailure::new(
            3,
            "Broken",
            FormatError::MissingOrigin {
                cell: "B4".to_string(),
            },
        );
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({ "num": 3, "name": "Broken", "error": "no origin record for data cell B4" })
        );
    }
}
