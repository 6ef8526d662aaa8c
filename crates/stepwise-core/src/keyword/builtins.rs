//! Keywords available without any provider or extension.

use super::args;
use super::{AsyncKeyword, Handler, KeywordError, KeywordOutput, KeywordRegistry, KeywordSignature};
use crate::condition::{self, CmpOp};
use crate::model::Vars;
use crate::render::{self, value_to_string};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Upper bound for `wait`, to keep a typo from parking a worker for hours.
const MAX_WAIT_SECS: f64 = 3600.0;

pub fn register_builtins(registry: &KeywordRegistry) {
    registry.register_with(
        KeywordSignature::new("log", &["message", "level"]).describe("Write a message to the run log"),
        Handler::sync(log),
    );
    registry.register_with(
        KeywordSignature::new("set_var", &["name", "value"])
            .describe("Store a value (or every argument) as step outputs"),
        Handler::sync(set_var),
    );
    for name in ["wait", "sleep"] {
        registry.register_with(
            KeywordSignature::new(name, &["seconds"]).describe("Pause the case without blocking others"),
            Handler::from_async(Wait),
        );
    }
    registry.register_with(
        KeywordSignature::new("assert", &["value", "expected", "op", "message"])
            .describe("Compare value against expected (== != > < >= <= contains)"),
        Handler::sync(assert),
    );
    registry.register_with(
        KeywordSignature::new("assert_expr", &["expr", "message"])
            .describe("Evaluate a condition over the step arguments"),
        Handler::sync(assert_expr),
    );
    registry.register_with(
        KeywordSignature::new("extract_json", &["from", "path", "index", "var"])
            .describe("Pick a value out of JSON by dotted path"),
        Handler::sync(extract_json),
    );
    registry.register_with(
        KeywordSignature::new("extract_regex", &["from", "pattern", "group", "index", "var"])
            .describe("Pick a regex capture out of text"),
        Handler::sync(extract_regex),
    );
    registry.register_with(
        KeywordSignature::new("fail", &["message"]).describe("Fail the step unconditionally"),
        Handler::sync(fail),
    );
}

fn log(args: &Vars) -> Result<KeywordOutput, KeywordError> {
    let message = args::text("log", args, "message")?;
    match args::optional_text(args, "level").as_deref() {
        Some("debug") => debug!(target: "stepwise::case", "{message}"),
        Some("warn") | Some("warning") => warn!(target: "stepwise::case", "{message}"),
        Some("error") => error!(target: "stepwise::case", "{message}"),
        _ => info!(target: "stepwise::case", "{message}"),
    }
    Ok(KeywordOutput::value(message))
}

fn set_var(args: &Vars) -> Result<KeywordOutput, KeywordError> {
    match args.get("name") {
        Some(name) => {
            let name = value_to_string(name);
            if name.is_empty() {
                return Err(KeywordError::invalid("set_var", "'name' must not be empty"));
            }
            let value = args.get("value").cloned().unwrap_or(Value::Null);
            Ok(KeywordOutput::value(value.clone()).with_output(name, value))
        }
        None if args.is_empty() => Err(KeywordError::invalid("set_var", "nothing to set")),
        None => Ok(KeywordOutput {
            outputs: args.clone(),
            ..KeywordOutput::none()
        }),
    }
}

struct Wait;

#[async_trait]
impl AsyncKeyword for Wait {
    async fn call(&self, args: Vars) -> Result<KeywordOutput, KeywordError> {
        let secs = match args::optional_f64("wait", &args, "seconds")? {
            Some(s) => s,
            None => args::optional_f64("wait", &args, "ms")?.map_or(0.0, |ms| ms / 1000.0),
        };
        if !(0.0..=MAX_WAIT_SECS).contains(&secs) {
            return Err(KeywordError::invalid(
                "wait",
                format!("duration must be between 0 and {MAX_WAIT_SECS} seconds"),
            ));
        }
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        Ok(KeywordOutput::value(secs))
    }
}

fn assert(args: &Vars) -> Result<KeywordOutput, KeywordError> {
    let value = args::required("assert", args, "value")?;
    let expected = args::required("assert", args, "expected")?;
    let op_text = args::optional_text(args, "op").unwrap_or_else(|| "==".to_string());
    let op = CmpOp::parse(op_text.trim())
        .ok_or_else(|| KeywordError::invalid("assert", format!("unsupported operator '{op_text}'")))?;

    if condition::compare(op, value, expected) {
        return Ok(KeywordOutput::value(true));
    }
    let message = args::optional_text(args, "message").unwrap_or_else(|| {
        format!(
            "assertion failed: {} {} {}",
            value_to_string(value),
            op_text.trim(),
            value_to_string(expected)
        )
    });
    Err(KeywordError::Failed(message))
}

/// The expression sees the other step arguments as variables.
fn assert_expr(args: &Vars) -> Result<KeywordOutput, KeywordError> {
    let expr = args::text("assert_expr", args, "expr")?;
    let passed = condition::evaluate(&expr, args)
        .map_err(|e| KeywordError::invalid("assert_expr", e.to_string()))?;
    if passed {
        return Ok(KeywordOutput::value(true));
    }
    let message = args::optional_text(args, "message")
        .unwrap_or_else(|| format!("expression is false: {expr}"));
    Err(KeywordError::Failed(message))
}

fn extract_json(args: &Vars) -> Result<KeywordOutput, KeywordError> {
    let source = args::required("extract_json", args, "from")?;
    let path = args::text("extract_json", args, "path")?;
    let index = args::optional_index("extract_json", args, "index")?;

    // text that holds a JSON document is parsed first
    let parsed;
    let root = match source {
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s).map_err(|e| {
                KeywordError::invalid("extract_json", format!("'from' is not JSON: {e}"))
            })?;
            &parsed
        }
        other => other,
    };

    let path = path.trim().trim_start_matches("$.").trim_start_matches('$');
    let mut current = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = render::descend(current, segment).ok_or_else(|| {
            KeywordError::Failed(format!("path '{path}' not found (stopped at '{segment}')"))
        })?;
    }
    let value = match (index, current) {
        (Some(i), Value::Array(items)) => items
            .get(i)
            .ok_or_else(|| KeywordError::Failed(format!("index {i} out of range for '{path}'")))?,
        (Some(_), _) => {
            return Err(KeywordError::invalid("extract_json", format!("'{path}' is not a list")))
        }
        (None, v) => v,
    };
    Ok(with_var(args, value.clone()))
}

fn extract_regex(args: &Vars) -> Result<KeywordOutput, KeywordError> {
    let text = args::text("extract_regex", args, "from")?;
    let pattern = args::text("extract_regex", args, "pattern")?;
    let re = Regex::new(&pattern)
        .map_err(|e| KeywordError::invalid("extract_regex", format!("bad pattern: {e}")))?;

    let default_group = usize::from(re.captures_len() > 1);
    let group = args::optional_index("extract_regex", args, "group")?.unwrap_or(default_group);
    let index = args::optional_index("extract_regex", args, "index")?.unwrap_or(0);

    let captures = re.captures_iter(&text).nth(index).ok_or_else(|| {
        KeywordError::Failed(format!("pattern '{pattern}' has no match #{index}"))
    })?;
    let matched = captures.get(group).ok_or_else(|| {
        KeywordError::Failed(format!("pattern '{pattern}' has no group {group}"))
    })?;
    Ok(with_var(args, Value::String(matched.as_str().to_string())))
}

fn fail(args: &Vars) -> Result<KeywordOutput, KeywordError> {
    let message = args::optional_text(args, "message").unwrap_or_else(|| "failed".to_string());
    Err(KeywordError::Failed(message))
}

/// Result value, also published under `var` when given.
fn with_var(args: &Vars, value: Value) -> KeywordOutput {
    let output = KeywordOutput::value(value.clone());
    match args::optional_text(args, "var") {
        Some(var) if !var.is_empty() => output.with_output(var, value),
        _ => output,
    }
}
