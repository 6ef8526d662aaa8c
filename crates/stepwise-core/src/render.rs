//! `${name}` placeholder substitution.
//!
//! Rendering never fails: a placeholder that cannot be resolved (or is not
//! terminated) is copied to the output unchanged.

use crate::model::Vars;
use serde_json::Value;

const OPEN: &str = "${";
const CLOSE: char = '}';

/// Renders every string inside `value`, recursing into maps and sequences.
/// Map key order is preserved; non-string scalars pass through.
pub fn render(value: &Value, vars: &Vars) -> Value {
    match value {
        Value::String(s) => Value::String(render_str(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, vars)).collect()),
        Value::Object(map) => Value::Object(render_map(map, vars)),
        other => other.clone(),
    }
}

pub fn render_map(map: &Vars, vars: &Vars) -> Vars {
    map.iter()
        .map(|(k, v)| (k.clone(), render(v, vars)))
        .collect()
}

pub fn render_str(input: &str, vars: &Vars) -> String {
    if !input.contains(OPEN) {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    while let Some(offset) = input[cursor..].find(OPEN) {
        let start = cursor + offset;
        out.push_str(&input[cursor..start]);

        let body_start = start + OPEN.len();
        let Some(len) = input[body_start..].find(CLOSE) else {
            // unterminated: keep the tail verbatim
            cursor = start;
            break;
        };
        let end = body_start + len + CLOSE.len_utf8();
        let token = input[body_start..body_start + len].trim();

        match resolve(vars, token) {
            Some(value) => out.push_str(&value_to_string(value)),
            None => out.push_str(&input[start..end]),
        }
        cursor = end;
    }
    out.push_str(&input[cursor..]);
    out
}

/// Resolves `name` or a dotted path such as `resp.items.0.id`.
///
/// A key that literally contains dots (`provider.host`) wins over traversal.
pub fn resolve<'a>(vars: &'a Vars, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    if let Some(v) = vars.get(path) {
        return Some(v);
    }
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = vars.get(first)?;
    for segment in segments {
        current = descend(current, segment)?;
    }
    Some(current)
}

/// One traversal step into an object key or array index.
pub fn descend<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// String form used when a value is spliced into text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn contains_placeholder(input: &str) -> bool {
    input
        .find(OPEN)
        .is_some_and(|start| input[start + OPEN.len()..].contains(CLOSE))
}
