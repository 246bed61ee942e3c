//! Collection linker
//!
//! Groups formatted sheets into named collections. Records of `origin`
//! sheets are keyed by their reference key; records of `array` and `map`
//! sheets are merged into the origin record named by their `__ref` field,
//! at the location given by the sheet's `key` path and the record's `__in`
//! index path.

use serde_json::{Map, Value};

use crate::builder::{IN_FIELD, KEY_FIELD, REF_FIELD};
use crate::error::LinkError;
use crate::options::{SheetKind, SheetOptions};
use crate::report::{Collection, LinkReport, UnresolvedLink};
use crate::sheet::FormattedSheet;
use crate::tree::{self, MAX_ARRAY_INDEX, Record};

/// One segment of a sheet's `key` path paired with its `__in` segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step<'a> {
    /// `#name`: element `index` of the array under `name`
    Indexed { name: &'a str, index: usize },
    /// `$`: existing child named by the `__in` segment
    Dynamic { key: &'a str },
    /// Plain object key, created when vacant
    Field { name: &'a str, last: bool },
}

/// Shape of the container a step lands on when it does not exist yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fresh {
    Object,
    Array,
}

enum Reach<'a> {
    Existing(&'a Value),
    Created(Fresh),
}

/// Link formatted sheets, in workbook order, into collections
pub fn link_collections(sheets: Vec<FormattedSheet>) -> LinkReport {
    let mut report = LinkReport::default();

    for sheet in sheets {
        let name = sheet.collection_name().to_string();
        let FormattedSheet {
            name: sheet_name,
            opts,
            list,
            ..
        } = sheet;

        let _span = tracing::debug_span!("link", collection = %name, sheet = %sheet_name).entered();
        let kind = opts.kind();
        let mut unresolved = Vec::new();
        {
            let collection = report.collections.entry(name.clone()).or_default();
            for record in list {
                let outcome = match kind {
                    SheetKind::Origin => insert_origin(collection, &opts.ref_key, record),
                    SheetKind::Array | SheetKind::Map => link_record(collection, &opts, record),
                };
                if let Err((reason, record)) = outcome {
                    unresolved.push(UnresolvedLink::new(sheet_name.clone(), reason, record));
                }
            }
            tracing::debug!(records = collection.len(), "linked sheet");
        }
        for link in unresolved {
            report.push_error(&name, link);
        }

        match report.options.get_mut(&name) {
            Some(canonical) => canonical.merge_from(&opts),
            None => {
                report.options.insert(name, opts);
            }
        }
    }

    tracing::info!(
        collections = report.collections.len(),
        unresolved = report.unresolved_count(),
        "linked collections"
    );
    report
}

type Outcome = Result<(), (LinkError, Record)>;

/// Store an origin record under its reference key; a repeated key replaces the earlier record
fn insert_origin(collection: &mut Collection, ref_key: &str, record: Record) -> Outcome {
    let Some(key) = record.get(ref_key).and_then(tree::key_string) else {
        let reason = LinkError::MissingRefKey {
            ref_key: ref_key.to_string(),
        };
        return Err((reason, record));
    };
    if collection.insert(key.clone(), Value::Object(record)).is_some() {
        tracing::debug!(key = %key, "origin record replaced");
    }
    Ok(())
}

/// Merge a sub record into its origin, leaving the collection untouched on failure
fn link_record(collection: &mut Collection, opts: &SheetOptions, record: Record) -> Outcome {
    if let Err(reason) = locate(collection, opts, &record) {
        return Err((reason, record));
    }
    attach(collection, opts, record)
}

fn ref_value(record: &Record) -> Option<String> {
    record.get(REF_FIELD).and_then(tree::key_string)
}

fn map_key(record: &Record) -> Option<String> {
    record
        .get(KEY_FIELD)
        .filter(|v| tree::is_truthy(v))
        .and_then(tree::key_string)
}

/// Read-only dry run of [`attach`]
fn locate(collection: &Collection, opts: &SheetOptions, record: &Record) -> Result<(), LinkError> {
    let origin = ref_value(record)
        .and_then(|key| collection.get(&key))
        .filter(|v| tree::is_truthy(v))
        .ok_or(LinkError::OriginNotFound)?;
    let steps = plan_steps(opts, record)?;
    let kind = opts.kind();

    let mut reach = Reach::Existing(origin);
    for step in &steps {
        reach = reach_step(reach, *step, kind)?;
    }

    match kind {
        SheetKind::Array => match reach {
            Reach::Existing(Value::Array(_)) | Reach::Created(Fresh::Array) => Ok(()),
            _ => Err(LinkError::NotAnArray),
        },
        _ => {
            if map_key(record).is_none() {
                return Err(LinkError::MissingMapKey);
            }
            match reach {
                Reach::Existing(Value::Object(_)) | Reach::Created(Fresh::Object) => Ok(()),
                _ => Err(LinkError::NotAnObject),
            }
        }
    }
}

fn reach_step<'a>(reach: Reach<'a>, step: Step<'_>, kind: SheetKind) -> Result<Reach<'a>, LinkError> {
    let current = match reach {
        Reach::Existing(value) => value,
        Reach::Created(fresh) => {
            return match step {
                Step::Dynamic { key } => Err(LinkError::OriginPartNotFound {
                    segment: key.to_string(),
                }),
                _ if fresh == Fresh::Array => Err(LinkError::NotAnObject),
                Step::Indexed { .. } => Ok(Reach::Created(Fresh::Object)),
                Step::Field { last, .. } => Ok(Reach::Created(fresh_field(last, kind))),
            };
        }
    };

    match step {
        Step::Indexed { name, index } => {
            let object = current.as_object().ok_or(LinkError::NotAnObject)?;
            let Some(items) = object.get(name).filter(|v| tree::is_truthy(v)) else {
                return Ok(Reach::Created(Fresh::Object));
            };
            let items = items.as_array().ok_or(LinkError::NotAnArray)?;
            match items.get(index).filter(|v| tree::is_truthy(v)) {
                Some(element) if element.is_object() => Ok(Reach::Existing(element)),
                Some(_) => Err(LinkError::NotAnObject),
                None => Ok(Reach::Created(Fresh::Object)),
            }
        }
        Step::Dynamic { key } => tree::child(current, key)
            .map(Reach::Existing)
            .ok_or_else(|| LinkError::OriginPartNotFound {
                segment: key.to_string(),
            }),
        Step::Field { name, last } => {
            let object = current.as_object().ok_or(LinkError::NotAnObject)?;
            Ok(match object.get(name).filter(|v| tree::is_truthy(v)) {
                Some(child) => Reach::Existing(child),
                None => Reach::Created(fresh_field(last, kind)),
            })
        }
    }
}

fn fresh_field(last: bool, kind: SheetKind) -> Fresh {
    if last && kind == SheetKind::Array {
        Fresh::Array
    } else {
        Fresh::Object
    }
}

/// Walk the origin along the key path, creating containers, and merge the record
fn attach(collection: &mut Collection, opts: &SheetOptions, mut record: Record) -> Outcome {
    let target = match resolve_target(collection, opts, &record) {
        Ok(target) => target,
        Err(reason) => return Err((reason, record)),
    };

    let slot = match opts.kind() {
        SheetKind::Array => {
            let Some(items) = target.as_array_mut() else {
                return Err((LinkError::NotAnArray, record));
            };
            items.push(Value::Object(Map::new()));
            items.last_mut()
        }
        _ => {
            let Some(key) = map_key(&record) else {
                return Err((LinkError::MissingMapKey, record));
            };
            let Some(object) = target.as_object_mut() else {
                return Err((LinkError::NotAnObject, record));
            };
            object.insert(key.clone(), Value::Object(Map::new()));
            object.get_mut(&key)
        }
    };
    let Some(Value::Object(destination)) = slot else {
        return Err((LinkError::NotAnObject, record));
    };

    record.remove(REF_FIELD);
    record.remove(IN_FIELD);
    record.remove(KEY_FIELD);
    destination.extend(record);
    Ok(())
}

fn resolve_target<'c>(
    collection: &'c mut Collection,
    opts: &SheetOptions,
    record: &Record,
) -> Result<&'c mut Value, LinkError> {
    let steps = plan_steps(opts, record)?;
    let kind = opts.kind();
    let key = ref_value(record).ok_or(LinkError::OriginNotFound)?;
    let mut node = collection
        .get_mut(&key)
        .ok_or(LinkError::OriginNotFound)?;

    for step in steps {
        node = match step {
            Step::Indexed { name, index } => {
                let items = tree::field_or_insert(node, name, || Value::Array(Vec::new()))
                    .ok_or(LinkError::NotAnObject)?;
                tree::element_or_insert(items, index).ok_or(LinkError::NotAnArray)?
            }
            Step::Dynamic { key } => {
                tree::child_mut(node, key).ok_or_else(|| LinkError::OriginPartNotFound {
                    segment: key.to_string(),
                })?
            }
            Step::Field { name, last } => {
                let fresh = fresh_field(last, kind);
                tree::field_or_insert(node, name, || match fresh {
                    Fresh::Array => Value::Array(Vec::new()),
                    Fresh::Object => Value::Object(Map::new()),
                })
                .ok_or(LinkError::NotAnObject)?
            }
        };
    }
    Ok(node)
}

/// Pair the sheet's key path with the record's `__in` index path
fn plan_steps<'a>(opts: &'a SheetOptions, record: &'a Record) -> Result<Vec<Step<'a>>, LinkError> {
    let key = opts
        .key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(LinkError::MissingKeyPath)?;
    let path_in: Vec<&str> = match record.get(IN_FIELD) {
        Some(Value::String(s)) if !s.is_empty() => s.split('.').collect(),
        _ => Vec::new(),
    };

    let segments: Vec<&str> = key.split('.').collect();
    let count = segments.len();
    segments
        .into_iter()
        .enumerate()
        .map(|(i, segment)| {
            let path_segment = path_in.get(i).copied();
            if let Some(name) = segment.strip_prefix('#') {
                let index = path_segment
                    .and_then(parse_in_index)
                    .ok_or_else(|| LinkError::MissingIndex {
                        segment: segment.to_string(),
                    })?;
                Ok(Step::Indexed { name, index })
            } else if segment == "$" {
                let key = path_segment.ok_or_else(|| LinkError::OriginPartNotFound {
                    segment: segment.to_string(),
                })?;
                Ok(Step::Dynamic { key })
            } else {
                Ok(Step::Field {
                    name: segment,
                    last: i + 1 == count,
                })
            }
        })
        .collect()
}

/// Position named by an `__in` segment such as `#items:2` or `2`
fn parse_in_index(segment: &str) -> Option<usize> {
    let digits = match segment.rsplit_once(':') {
        Some((_, digits)) => digits,
        None => segment,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok().filter(|&i| i <= MAX_ARRAY_INDEX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SheetOutput;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    fn sheet(num: usize, name: &str, option_cell: Value, list: Vec<Value>) -> FormattedSheet {
        let mut opts = SheetOptions::default();
        opts.apply_option_cell(&option_cell.to_string()).unwrap();
        FormattedSheet::new(
            num,
            name,
            SheetOutput {
                opts,
                list: list.into_iter().map(record).collect(),
            },
        )
    }

    fn origin_sheet() -> FormattedSheet {
        sheet(
            1,
            "Units",
            json!({}),
            vec![
                json!({ "_id": "aaa", "array": [{ "key": "a" }, { "key": "b" }] }),
                json!({ "_id": "bbb" }),
            ],
        )
    }

    fn collection_json(report: &LinkReport, name: &str) -> Value {
        serde_json::to_value(&report.collections[name]).unwrap()
    }

    #[test]
    fn test_origin_records_keyed_by_ref() {
        let report = link_collections(vec![origin_sheet()]);
        assert!(report.is_clean());
        assert_eq!(
            report.collections["Units"].keys().collect::<Vec<_>>(),
            vec!["aaa", "bbb"]
        );
    }

    #[test]
    fn test_duplicate_ref_key_last_wins() {
        let sheet = sheet(
            1,
            "Units",
            json!({}),
            vec![json!({ "_id": "a", "v": 1 }), json!({ "_id": "b" }), json!({ "_id": "a", "v": 2 })],
        );
        let report = link_collections(vec![sheet]);
        assert_eq!(collection_json(&report, "Units"), json!({ "a": { "_id": "a", "v": 2 }, "b": { "_id": "b" } }));
    }

    #[test]
    fn test_numeric_ref_key() {
        let sheet = sheet(1, "Units", json!({}), vec![json!({ "_id": 10 }), json!({ "name": "none" })]);
        let report = link_collections(vec![sheet]);
        assert!(report.collections["Units"].contains_key("10"));
        assert_eq!(
            report.errors["Units"][0].reason,
            LinkError::MissingRefKey {
                ref_key: "_id".to_string()
            }
        );
    }

    #[test]
    fn test_array_sheet_appends_in_row_order() {
        let child = sheet(
            2,
            "Extra",
            json!({ "type": "array", "name": "Units", "key": "obj.array" }),
            vec![
                json!({ "__ref": "bbb", "n": 1 }),
                json!({ "__ref": "bbb", "n": 2 }),
            ],
        );
        let report = link_collections(vec![origin_sheet(), child]);
        assert!(report.is_clean());
        assert_eq!(
            report.collections["Units"]["bbb"],
            json!({ "_id": "bbb", "obj": { "array": [{ "n": 1 }, { "n": 2 }] } })
        );
        assert!(!report.collections.contains_key("Extra"));
    }

    #[test]
    fn test_indexed_path_uses_in_field() {
        let child = sheet(
            2,
            "Extra",
            json!({ "type": "array", "name": "Units", "key": "#array.items" }),
            vec![
                json!({ "__ref": "aaa", "__in": "#array:1", "x": true }),
                json!({ "__ref": "aaa", "__in": "#array:3", "x": false }),
            ],
        );
        let report = link_collections(vec![origin_sheet(), child]);
        assert!(report.is_clean());
        assert_eq!(
            report.collections["Units"]["aaa"]["array"],
            json!([
                { "key": "a" },
                { "key": "b", "items": [{ "x": true }] },
                null,
                { "items": [{ "x": false }] }
            ])
        );
    }

    #[test]
    fn test_map_sheet_stores_under_key() {
        let child = sheet(
            2,
            "Extra",
            json!({ "type": "map", "name": "Units", "key": "stats" }),
            vec![
                json!({ "__ref": "aaa", "__key": "hp", "v": 10 }),
                json!({ "__ref": "aaa", "__key": "mp", "v": 5 }),
                json!({ "__ref": "aaa", "__key": "hp", "v": 12 }),
            ],
        );
        let report = link_collections(vec![origin_sheet(), child]);
        assert!(report.is_clean());
        assert_eq!(
            report.collections["Units"]["aaa"]["stats"],
            json!({ "hp": { "v": 12 }, "mp": { "v": 5 } })
        );
    }

    #[test]
    fn test_dynamic_segment_requires_existing_child() {
        let child = sheet(
            2,
            "Extra",
            json!({ "type": "map", "name": "Units", "key": "array.$" }),
            vec![
                json!({ "__ref": "aaa", "__in": "array.0", "__key": "k", "v": 1 }),
                json!({ "__ref": "aaa", "__in": "array.5", "__key": "k", "v": 2 }),
            ],
        );
        let report = link_collections(vec![origin_sheet(), child]);
        assert_eq!(
            report.collections["Units"]["aaa"]["array"][0],
            json!({ "key": "a", "k": { "v": 1 } })
        );
        assert_eq!(
            report.errors["Units"][0].reason,
            LinkError::OriginPartNotFound {
                segment: "5".to_string()
            }
        );
    }

    #[test]
    fn test_missing_map_key_leaves_collection_unmodified() {
        let child = sheet(
            2,
            "Extra",
            json!({ "type": "map", "name": "Units", "key": "deep.stats" }),
            vec![json!({ "__ref": "bbb", "v": 1 })],
        );
        let before = link_collections(vec![origin_sheet()]);
        let report = link_collections(vec![origin_sheet(), child]);
        assert_eq!(report.collections, before.collections);

        let errors = &report.errors["Units"];
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].reason, LinkError::MissingMapKey);
        assert_eq!(errors[0].sheet, "Extra");
        assert_eq!(Value::Object(errors[0].record.clone()), json!({ "__ref": "bbb", "v": 1 }));
    }

    #[test]
    fn test_unresolvable_records_are_reported() {
        let child = sheet(
            2,
            "Extra",
            json!({ "type": "array", "name": "Units", "key": "#array.items" }),
            vec![
                json!({ "__ref": "zzz", "__in": "#array:0" }),
                json!({ "__ref": "aaa", "__in": "#array:x" }),
                json!({ "__ref": "aaa" }),
            ],
        );
        let report = link_collections(vec![origin_sheet(), child]);
        let reasons: Vec<_> = report.errors["Units"].iter().map(|e| e.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                LinkError::OriginNotFound,
                LinkError::MissingIndex {
                    segment: "#array".to_string()
                },
                LinkError::MissingIndex {
                    segment: "#array".to_string()
                },
            ]
        );
        assert_eq!(report.collections, link_collections(vec![origin_sheet()]).collections);
    }

    #[test]
    fn test_array_target_must_be_array() {
        let child = sheet(
            2,
            "Extra",
            json!({ "type": "array", "name": "Units", "key": "array.0" }),
            vec![json!({ "__ref": "aaa" })],
        );
        let report = link_collections(vec![origin_sheet(), child]);
        assert_eq!(report.errors["Units"][0].reason, LinkError::NotAnObject);

        let child = sheet(
            2,
            "Extra",
            json!({ "type": "array", "name": "Units", "key": "_id" }),
            vec![json!({ "__ref": "aaa" })],
        );
        let report = link_collections(vec![origin_sheet(), child]);
        assert_eq!(report.errors["Units"][0].reason, LinkError::NotAnArray);
    }

    #[test]
    fn test_missing_key_path() {
        let child = sheet(2, "Extra", json!({ "type": "array", "name": "Units" }), vec![json!({ "__ref": "aaa" })]);
        let report = link_collections(vec![origin_sheet(), child]);
        assert_eq!(report.errors["Units"][0].reason, LinkError::MissingKeyPath);
    }

    #[test]
    fn test_canonical_options_merge() {
        let mut first = origin_sheet();
        first.opts.format.insert("A".to_string(), crate::header::Format::parse("_id"));
        let mut child = sheet(
            2,
            "Extra",
            json!({ "type": "array", "name": "Units", "key": "list" }),
            vec![json!({ "__ref": "aaa" })],
        );
        child.opts.format.insert("A".to_string(), crate::header::Format::parse("__ref"));

        let report = link_collections(vec![first, child]);
        let opts = &report.options["Units"];
        assert_eq!(opts.name.as_deref(), Some("Units"));
        assert_eq!(opts.kind, Some(SheetKind::Array));
        assert_eq!(opts.format["A"].key, "__ref");
        assert_eq!(report.options.len(), 1);
    }

    #[test]
    fn test_parse_in_index() {
        assert_eq!(parse_in_index("#array:2"), Some(2));
        assert_eq!(parse_in_index("7"), Some(7));
        assert_eq!(parse_in_index("#array:"), None);
        assert_eq!(parse_in_index("#array"), None);
        assert_eq!(parse_in_index("x:1a"), None);
    }
}
