//! Defensive field extraction over untyped search-store documents.
//!
//! Hit sources are opaque JSON trees. Instead of per-shape casts, callers
//! describe what they want as a dot path and get a best-effort string back;
//! a missing segment yields the empty value rather than an error.

use chrono::{DateTime, Local};
use serde_json::Value;

/// Walks `root` along a dot-separated path and renders the leaf as a string.
///
/// Scalars format naturally (numbers without quotes, booleans as
/// `true`/`false`); objects and arrays are re-serialized as JSON; `null` or
/// any missing segment yields `""`.
pub fn path_lookup(root: &Value, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let mut cur = root;
    for part in path.split('.') {
        match cur.get(part) {
            Some(next) => cur = next,
            None => return String::new(),
        }
    }
    render_value(cur)
}

fn render_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// String field on an object, `""` when absent or not a string.
pub fn get_str<'a>(obj: &'a Value, key: &str) -> &'a str {
    obj.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Integer field on an object; accepts both integer and float encodings.
pub fn get_int(obj: &Value, key: &str) -> i64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

/// Nested object field; `Value::Null` stands in for a missing map so the
/// getters above keep composing.
pub fn get_map<'a>(obj: &'a Value, key: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    match obj.get(key) {
        Some(v @ Value::Object(_)) => v,
        _ => &NULL,
    }
}

/// Timestamp field: RFC-3339 strings are re-rendered in local time as
/// `YYYY-MM-DD HH:MM:SS`; anything else is passed through verbatim.
pub fn get_local_time(obj: &Value, key: &str) -> String {
    let raw = get_str(obj, key);
    format_local_time(raw)
}

/// Renders an RFC-3339 timestamp in the local timezone, or echoes the input
/// when it does not parse.
pub fn format_local_time(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => t
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}
