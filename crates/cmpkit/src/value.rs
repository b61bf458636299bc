//! Dotted-path access into JSON payloads.

use serde_json::Value;

/// Resolve a dotted path (`a.b.0.c`) inside a JSON value.
///
/// Numeric segments index into arrays. An empty path returns the value
/// itself. Missing segments yield `None`.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Render a scalar as display text; `null` becomes the empty string.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
