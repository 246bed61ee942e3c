//! Create-if-absent navigation over JSON value trees
//!
//! A slot counts as vacant when it is missing or holds an empty value
//! (`null`, `false`, `0`, `""`). Vacant slots are replaced on write, every
//! other value is kept.

use serde_json::{Map, Value};

/// A record: one nested JSON object built from sheet rows
pub type Record = Map<String, Value>;

/// Largest array position a sheet may address
pub const MAX_ARRAY_INDEX: usize = 1 << 20;

/// Whether a value counts as present
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn is_vacant(slot: Option<&Value>) -> bool {
    !slot.is_some_and(is_truthy)
}

/// Object stored under `key`, created when the slot is vacant
///
/// Returns `None` when the slot holds a value that is not an object.
pub fn object_at<'a>(map: &'a mut Record, key: &str) -> Option<&'a mut Record> {
    if is_vacant(map.get(key)) {
        map.insert(key.to_string(), Value::Object(Map::new()));
    }
    map.get_mut(key)?.as_object_mut()
}

/// Array stored under `key`, created when the slot is vacant
pub fn array_at<'a>(map: &'a mut Record, key: &str) -> Option<&'a mut Vec<Value>> {
    if is_vacant(map.get(key)) {
        map.insert(key.to_string(), Value::Array(Vec::new()));
    }
    map.get_mut(key)?.as_array_mut()
}

/// Object at `index`, padding with `null` and creating it when vacant
pub fn element_object(array: &mut Vec<Value>, index: usize) -> Option<&mut Record> {
    if index > MAX_ARRAY_INDEX {
        return None;
    }
    if array.len() <= index {
        array.resize(index + 1, Value::Null);
    }
    if !is_truthy(&array[index]) {
        array[index] = Value::Object(Map::new());
    }
    array[index].as_object_mut()
}

/// Write `value` under `key` unless a present value is already there
pub fn fill_field(map: &mut Record, key: &str, value: impl FnOnce() -> Value) -> bool {
    if !is_vacant(map.get(key)) {
        return false;
    }
    map.insert(key.to_string(), value());
    true
}

/// Write `value` at `index` unless a present value is already there
pub fn fill_element(array: &mut Vec<Value>, index: usize, value: impl FnOnce() -> Value) -> bool {
    if index > MAX_ARRAY_INDEX || !is_vacant(array.get(index)) {
        return false;
    }
    if array.len() <= index {
        array.resize(index + 1, Value::Null);
    }
    array[index] = value();
    true
}

/// Child of an object or array value under a string segment, without creating it
pub fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    let found = match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    };
    found.filter(|v| is_truthy(v))
}

/// Mutable counterpart of [`child`]
pub fn child_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    let found = match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    };
    found.filter(|v| is_truthy(v))
}

/// Field of an object value, inserting `default()` when vacant
pub fn field_or_insert<'a>(
    value: &'a mut Value,
    key: &str,
    default: impl FnOnce() -> Value,
) -> Option<&'a mut Value> {
    let map = value.as_object_mut()?;
    if is_vacant(map.get(key)) {
        map.insert(key.to_string(), default());
    }
    map.get_mut(key)
}

/// Element of an array value, inserting an empty object when vacant
pub fn element_or_insert(value: &mut Value, index: usize) -> Option<&mut Value> {
    let items = value.as_array_mut()?;
    element_object(items, index)?;
    items.get_mut(index)
}

/// String form of a scalar used as a lookup key
///
/// Arrays join their elements with `,`; objects and `null` have no key form.
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|v| match v {
                    Value::Null => String::new(),
                    other => key_string(other).unwrap_or_default(),
                })
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Null | Value::Object(_) => None,
    }
}
