//! Dotted field paths over JSON documents.
//!
//! Paths are `.`-separated object keys. Arrays met along the way are
//! traversed element-wise, so `drugbank.products.ndc_product_code` yields one
//! value per product.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldPathError {
    #[error("empty field path")]
    Empty,
    #[error("cannot write `{path}`: `{segment}` is not an object")]
    NotAnObject { path: String, segment: String },
}

/// All values found at `path`. Arrays are flattened (one level per segment and
/// once at the leaf).
pub fn values_at<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current: Vec<&Value> = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(obj) => {
                    if let Some(child) = obj.get(segment) {
                        push_flat(child, &mut next);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(child) = item.as_object().and_then(|o| o.get(segment)) {
                            push_flat(child, &mut next);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}

fn push_flat<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => out.extend(items.iter()),
        other => out.push(other),
    }
}

/// Normalise a scalar JSON value into a lookup key.
///
/// Strings are trimmed; blank strings, nulls, booleans and containers are not
/// keys. Numbers are printed as JSON prints them (`2244`, not `"2244"`).
pub fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Distinct keys at `path`, in document order.
pub fn key_strings_at(doc: &Value, path: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values_at(doc, path) {
        if let Some(key) = scalar_key(value) {
            if !out.contains(&key) {
                out.push(key);
            }
        }
    }
    out
}

/// Write `value` at `path`, creating intermediate objects as needed.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<(), FieldPathError> {
    if path.is_empty() {
        return Err(FieldPathError::Empty);
    }
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments.split_last().ok_or(FieldPathError::Empty)?;

    let mut cursor = doc;
    for segment in parents {
        let obj = cursor
            .as_object_mut()
            .ok_or_else(|| FieldPathError::NotAnObject {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
        cursor = obj
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let obj = cursor
        .as_object_mut()
        .ok_or_else(|| FieldPathError::NotAnObject {
            path: path.to_string(),
            segment: last.to_string(),
        })?;
    obj.insert(last.to_string(), value);
    Ok(())
}
