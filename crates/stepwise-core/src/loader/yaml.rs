//! YAML case documents.
//!
//! ```yaml
//! desc: Login
//! context: {user: bob}
//! pre_script:
//!   - token = ${seed_token}
//! steps:
//!   - open login page:
//!       keyword: navigate
//!       url: ${base}/login
//!   - check:
//!       keyword: assert
//!       value: ${status}
//!       expected: 200
//!       continue_on_error: true
//! variants:
//!   - {desc: A, user: alice}
//! post_script:
//!   - {keyword: log, message: done}
//! ```
//!
//! Unknown top-level keys are treated as extra case-local context.

use super::expand;
use crate::errors::EngineError;
use crate::model::{Case, HookAction, HookPhase, Step, Vars};
use crate::render::value_to_string;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;

/// Step argument keys that configure the step instead of the keyword.
pub const RESERVED_STEP_KEYS: &[&str] = &["keyword", "continue_on_error", "save_as", "when"];

#[derive(Debug, Deserialize)]
struct RawCase {
    /// Any scalar; `desc: 2024` names the case "2024".
    #[serde(default, alias = "name")]
    desc: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    context: Vars,
    #[serde(default, deserialize_with = "null_as_default")]
    steps: Vec<Value>,
    #[serde(default, alias = "ddts", deserialize_with = "null_as_default")]
    variants: Vec<Vars>,
    #[serde(default, alias = "preScript", alias = "pre_hooks")]
    pre_script: Value,
    #[serde(default, alias = "postScript", alias = "post_hooks")]
    post_script: Value,
    #[serde(default = "default_true")]
    stop_on_failure: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    metadata: Vars,
    #[serde(flatten)]
    extra: Vars,
}

fn default_true() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn parse_file(path: &Path) -> Result<Vec<Case>, EngineError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::io(path.display().to_string(), e))?;
    parse_document(&text).map_err(|reason| EngineError::malformed(path.display().to_string(), reason))
}

/// Parses one document and expands its variants.
pub fn parse_document(text: &str) -> Result<Vec<Case>, String> {
    let raw: RawCase = serde_yaml::from_str(text).map_err(|e| e.to_string())?;

    let steps = raw
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| parse_step(i, s).map_err(|e| format!("step #{}: {e}", i + 1)))
        .collect::<Result<Vec<_>, _>>()?;

    let pre_hooks = parse_hooks(HookPhase::Pre, &raw.pre_script)?;
    let post_hooks = parse_hooks(HookPhase::Post, &raw.post_script)?;

    // top-level extras sit beneath the explicit `context` block
    let mut context = raw.extra;
    for (key, value) in raw.context {
        context.insert(key, value);
    }

    let template = Case {
        name: String::new(),
        tags: raw.tags,
        metadata: raw.metadata,
        context,
        steps,
        pre_hooks,
        post_hooks,
        stop_on_failure: raw.stop_on_failure,
        source: None,
        order: 0,
    };
    let desc = match &raw.desc {
        Value::Null => None,
        Value::Array(_) | Value::Object(_) => {
            return Err("'desc' must be a scalar".to_string());
        }
        other => Some(value_to_string(other)),
    };
    Ok(expand::expand(&template, desc.as_deref(), &raw.variants))
}

/// Accepts `{label: {keyword: .., args..}}` or the flat `{keyword: .., label: ..}`.
pub fn parse_step(index: usize, raw: &Value) -> Result<Step, String> {
    let Value::Object(map) = raw else {
        return Err("expected a mapping".to_string());
    };

    let (label, body) = if map.contains_key("keyword") {
        let label = map
            .get("label")
            .or_else(|| map.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("step_{}", index + 1));
        let mut body = map.clone();
        body.remove("label");
        body.remove("name");
        (label, body)
    } else if map.len() == 1 {
        let Some((label, body)) = map.iter().next() else {
            return Err("empty step".to_string());
        };
        let Value::Object(body) = body else {
            return Err(format!("step '{label}' must map to a mapping with a 'keyword'"));
        };
        (label.clone(), body.clone())
    } else {
        return Err("expected a single `label: {keyword: ..}` entry".to_string());
    };

    step_from_body(label, body)
}

fn step_from_body(label: String, mut body: Vars) -> Result<Step, String> {
    let keyword = match body.remove("keyword") {
        Some(Value::String(k)) if !k.trim().is_empty() => k.trim().to_string(),
        Some(_) => return Err(format!("step '{label}': 'keyword' must be a non-empty string")),
        None => return Err(format!("step '{label}': missing 'keyword'")),
    };
    let continue_on_error = match body.remove("continue_on_error") {
        None | Some(Value::Null) => None,
        Some(v) => Some(as_flag(&v).ok_or_else(|| {
            format!("step '{label}': continue_on_error must be a boolean")
        })?),
    };
    let save_as = match body.remove("save_as") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(_) => return Err(format!("step '{label}': save_as must be a string")),
    };
    let when = body.remove("when").and_then(condition_text);

    Ok(Step {
        label,
        keyword,
        arguments: body,
        continue_on_error,
        save_as,
        when,
    })
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn condition_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Hook lists accept a single entry or a sequence.
pub fn parse_hooks(phase: HookPhase, raw: &Value) -> Result<Vec<HookAction>, String> {
    let items: Vec<&Value> = match raw {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            parse_hook(phase, i, item).map_err(|e| format!("{phase}_script #{}: {e}", i + 1))
        })
        .collect()
}

/// A hook is an assignment string (`name = value`), a mapping
/// `{assign: "name = value", when: ..}`, or a keyword mapping.
pub fn parse_hook(phase: HookPhase, index: usize, raw: &Value) -> Result<HookAction, String> {
    match raw {
        Value::String(s) => parse_assignment(s, None),
        Value::Object(map) if map.contains_key("assign") => {
            let Some(Value::String(s)) = map.get("assign") else {
                return Err("'assign' must be a string".to_string());
            };
            let when = map.get("when").cloned().and_then(condition_text);
            parse_assignment(s, when)
        }
        Value::Object(map) if map.contains_key("keyword") => {
            let mut body = map.clone();
            let label = body
                .remove("label")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| format!("{phase}_hook_{}", index + 1));
            Ok(HookAction::Invoke(step_from_body(label, body)?))
        }
        _ => Err("expected an assignment string or a mapping with 'keyword'".to_string()),
    }
}

/// Parses `name = value`. JSON scalars (`3`, `true`, `"quoted"`) keep their
/// type; anything else is taken as text.
pub fn parse_assignment(text: &str, when: Option<String>) -> Result<HookAction, String> {
    let Some((name, value)) = text.split_once('=') else {
        return Err(format!("'{text}' is not of the form name = value"));
    };
    let name = name.trim();
    let valid_name = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if !valid_name {
        return Err(format!("'{name}' is not a valid variable name"));
    }

    let value = value.trim();
    let value = if let Some(inner) = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
    {
        Value::String(inner.to_string())
    } else {
        serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    };

    Ok(HookAction::Assign {
        name: name.to_string(),
        value,
        when,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_descriptions_name_the_case() {
        let cases = parse_document("desc: 2024\nsteps: []\n").unwrap();
        assert_eq!(cases[0].name, "2024");

        let cases = parse_document("name: true\nsteps: []\nvariants: [{desc: 1.5}]\n").unwrap();
        assert_eq!(cases[0].name, "true-1.5");

        assert!(parse_document("desc: [a, b]\nsteps: []\n").is_err());
    }

    #[test]
    fn parses_steps_and_lifts_reserved_keys() {
        let doc = r#"
desc: Login
steps:
  - open page:
      keyword: navigate
      url: ${base}/login
      when: ready == true
  - check:
      keyword: assert
      value: ${status}
      expected: 200
      continue_on_error: true
      save_as: verdict
"#;
        let cases = parse_document(doc).unwrap();
        assert_eq!(cases.len(), 1);
        let case = &cases[0];
        assert_eq!(case.name, "Login");
        assert!(case.stop_on_failure);

        assert_eq!(case.steps[0].label, "open page");
        assert_eq!(case.steps[0].keyword, "navigate");
        assert_eq!(case.steps[0].when.as_deref(), Some("ready == true"));
        assert_eq!(case.steps[0].arguments.get("url"), Some(&json!("${base}/login")));
        assert!(!case.steps[0].arguments.contains_key("when"));

        let check = &case.steps[1];
        assert_eq!(check.continue_on_error, Some(true));
        assert_eq!(check.save_as.as_deref(), Some("verdict"));
        let keys: Vec<_> = check.arguments.keys().cloned().collect();
        assert_eq!(keys, vec!["value", "expected"]);
    }

    #[test]
    fn ddts_alias_expands_variants() {
        let doc = r#"
desc: Login
context: {x: 0}
steps:
  - s: {keyword: log, message: "${x}"}
ddts:
  - {desc: A, x: 1}
  - {desc: B, x: 2}
"#;
        let cases = parse_document(doc).unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Login-A", "Login-B"]);
        assert_eq!(cases[0].context.get("x"), Some(&json!(1)));
        assert_eq!(cases[1].context.get("x"), Some(&json!(2)));
    }

    #[test]
    fn hooks_accept_assignments_and_keywords() {
        let doc = r#"
desc: Hooks
preScript:
  - token = abc
  - retries = 3
  - {assign: "mode = 'fast'", when: "env == 'ci'"}
post_script: {keyword: log, message: bye}
steps: []
"#;
        let case = parse_document(doc).unwrap().remove(0);
        assert_eq!(
            case.pre_hooks[0],
            HookAction::Assign { name: "token".into(), value: json!("abc"), when: None }
        );
        assert_eq!(
            case.pre_hooks[1],
            HookAction::Assign { name: "retries".into(), value: json!(3), when: None }
        );
        assert_eq!(
            case.pre_hooks[2],
            HookAction::Assign {
                name: "mode".into(),
                value: json!("fast"),
                when: Some("env == 'ci'".into())
            }
        );
        let HookAction::Invoke(step) = &case.post_hooks[0] else {
            panic!("expected keyword hook");
        };
        assert_eq!(step.keyword, "log");
        assert_eq!(step.label, "post_hook_1");
    }

    #[test]
    fn extra_top_level_keys_become_context() {
        let doc = "desc: X\nbase: http://x\ncontext:\n  base: http://y\n  user: bob\nsteps: []\n";
        let case = parse_document(doc).unwrap().remove(0);
        assert_eq!(case.context.get("base"), Some(&json!("http://y")));
        assert_eq!(case.context.get("user"), Some(&json!("bob")));
    }

    #[test]
    fn malformed_steps_are_rejected_with_position() {
        let err = parse_document("desc: X\nsteps:\n  - s: {url: x}\n").unwrap_err();
        assert!(err.contains("step #1"), "{err}");
        assert!(err.contains("missing 'keyword'"), "{err}");

        let err = parse_document("desc: X\nsteps:\n  - just a string\n").unwrap_err();
        assert!(err.contains("expected a mapping"), "{err}");

        let err = parse_document("desc: X\npre_script: ['= 1']\nsteps: []\n").unwrap_err();
        assert!(err.contains("pre_script #1"), "{err}");
    }
}
