//! # Structural Diff
//!
//! Compares a rendered object against the live one as plain JSON trees. The
//! desired object only states the fields this controller owns, so "unchanged"
//! means every field it sets already has that value in the live object;
//! anything else the server or other controllers added is ignored.

use serde_json::Value;

/// Whether `current` already carries every field `desired` sets
///
/// Null or empty desired values match absent fields. Lists of named entries
/// (containers, volumes, env) match by `name`, so entries injected by
/// admission webhooks are ignored; other arrays must have the same length and
/// match element by element. Numbers compare by value so `1` and `1.0` are
/// equal.
#[must_use]
pub fn is_subset(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Null, _) => true,
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(key, value)| match have.get(key) {
            Some(existing) => is_subset(value, existing),
            None => is_empty(value),
        }),
        (Value::Array(want), Value::Array(have)) if is_named_list(want) => want
            .iter()
            .all(|w| find_named(have, w).is_some_and(|h| is_subset(w, h))),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| is_subset(w, h))
        }
        (Value::Number(want), Value::Number(have)) => want == have || want.as_f64() == have.as_f64(),
        (want, have) => want == have,
    }
}

/// JSON-pointer paths where `current` does not match `desired`
///
/// Only used for logging what an apply is about to change.
#[must_use]
pub fn changed_paths(desired: &Value, current: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    walk(desired, current, String::new(), &mut paths);
    paths
}

fn walk(desired: &Value, current: &Value, path: String, paths: &mut Vec<String>) {
    match (desired, current) {
        (Value::Object(want), Value::Object(have)) => {
            for (key, value) in want {
                let child = format!("{path}/{}", escape(key));
                match have.get(key) {
                    Some(existing) => walk(value, existing, child, paths),
                    None if is_empty(value) => {}
                    None => paths.push(child),
                }
            }
        }
        (Value::Array(want), Value::Array(have)) if is_named_list(want) => {
            for (index, w) in want.iter().enumerate() {
                let child = format!("{path}/{index}");
                match find_named(have, w) {
                    Some(h) => walk(w, h, child, paths),
                    None => paths.push(child),
                }
            }
        }
        (Value::Array(want), Value::Array(have)) if want.len() == have.len() => {
            for (index, (w, h)) in want.iter().zip(have).enumerate() {
                walk(w, h, format!("{path}/{index}"), paths);
            }
        }
        _ if is_subset(desired, current) => {}
        _ => paths.push(if path.is_empty() { "/".to_string() } else { path }),
    }
}

fn entry_name(value: &Value) -> Option<&str> {
    value.get("name").and_then(Value::as_str)
}

fn is_named_list(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(|item| entry_name(item).is_some())
}

fn find_named<'a>(items: &'a [Value], wanted: &Value) -> Option<&'a Value> {
    let name = entry_name(wanted)?;
    items.iter().find(|item| entry_name(item) == Some(name))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.values().all(is_empty),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
