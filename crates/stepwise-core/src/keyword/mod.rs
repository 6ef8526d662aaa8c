//! Keyword handlers and their registry.
//!
//! A keyword is the name a step uses to request an action. Handlers are
//! registered with an explicit [`HandlerKind`] so the dispatcher never has to
//! guess whether a callable suspends.

pub mod builtins;
pub mod extension;
pub mod registry;

pub use crate::errors::KeywordError;
pub use registry::KeywordRegistry;

use crate::model::Vars;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What a handler hands back to the runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordOutput {
    /// Result value; stored under the step's `save_as` name when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Named values written to the step-output tier.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub outputs: Vars,
    /// Opaque references (screenshots, dumps) attached to the step result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl KeywordOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }

    pub fn with_attachment(mut self, attachment: impl Into<String>) -> Self {
        self.attachments.push(attachment.into());
        self
    }
}

/// Declared shape of a keyword, used for tabular parameter naming and listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSignature {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl KeywordSignature {
    pub fn new(name: impl Into<String>, params: &[&str]) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Sync,
    Async,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Sync => f.write_str("sync"),
            HandlerKind::Async => f.write_str("async"),
        }
    }
}

/// Handler that may suspend (waits, I/O, subprocesses).
#[async_trait]
pub trait AsyncKeyword: Send + Sync {
    async fn call(&self, args: Vars) -> Result<KeywordOutput, KeywordError>;
}

/// A collaborator that implements a family of keywords (browser driver, HTTP
/// client, ...).
#[async_trait]
pub trait KeywordProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn keywords(&self) -> Vec<KeywordSignature>;

    async fn execute(&self, keyword: &str, args: Vars) -> Result<KeywordOutput, KeywordError>;
}

pub type SyncFn = dyn Fn(&Vars) -> Result<KeywordOutput, KeywordError> + Send + Sync;

/// Registered callable, tagged with how it must be dispatched.
#[derive(Clone)]
pub enum Handler {
    /// Runs inline on the case task; must not block.
    Sync(Arc<SyncFn>),
    Async(Arc<dyn AsyncKeyword>),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Vars) -> Result<KeywordOutput, KeywordError> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    pub fn from_async<K: AsyncKeyword + 'static>(keyword: K) -> Self {
        Handler::Async(Arc::new(keyword))
    }

    pub fn kind(&self) -> HandlerKind {
        match self {
            Handler::Sync(_) => HandlerKind::Sync,
            Handler::Async(_) => HandlerKind::Async,
        }
    }

    pub async fn call(&self, args: Vars) -> Result<KeywordOutput, KeywordError> {
        match self {
            Handler::Sync(f) => f(&args),
            Handler::Async(k) => k.call(args).await,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{:?}", self.kind())
    }
}

/// Registry record: handler plus declared metadata.
#[derive(Debug, Clone)]
pub struct KeywordEntry {
    pub signature: KeywordSignature,
    pub handler: Handler,
}

impl KeywordEntry {
    pub fn kind(&self) -> HandlerKind {
        self.handler.kind()
    }
}

/// Adapter exposing one keyword of a provider as an [`AsyncKeyword`].
struct ProviderKeyword {
    provider: Arc<dyn KeywordProvider>,
    keyword: String,
}

#[async_trait]
impl AsyncKeyword for ProviderKeyword {
    async fn call(&self, args: Vars) -> Result<KeywordOutput, KeywordError> {
        self.provider.execute(&self.keyword, args).await
    }
}

/// Helpers for reading typed arguments inside handlers.
pub(crate) mod args {
    use super::KeywordError;
    use crate::model::Vars;
    use crate::render::value_to_string;
    use serde_json::Value;

    pub fn required<'a>(keyword: &str, args: &'a Vars, name: &str) -> Result<&'a Value, KeywordError> {
        args.get(name)
            .ok_or_else(|| KeywordError::invalid(keyword, format!("missing argument '{name}'")))
    }

    pub fn text(keyword: &str, args: &Vars, name: &str) -> Result<String, KeywordError> {
        required(keyword, args, name).map(value_to_string)
    }

    pub fn optional_text(args: &Vars, name: &str) -> Option<String> {
        args.get(name).filter(|v| !v.is_null()).map(value_to_string)
    }

    /// Non-negative integer, accepting numeric strings.
    pub fn optional_index(keyword: &str, args: &Vars, name: &str) -> Result<Option<usize>, KeywordError> {
        match args.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => {
                let parsed = match v {
                    Value::Number(n) => n.as_u64(),
                    Value::String(s) if s.trim().is_empty() => return Ok(None),
                    Value::String(s) => s.trim().parse::<u64>().ok(),
                    _ => None,
                };
                parsed
                    .and_then(|n| usize::try_from(n).ok())
                    .map(Some)
                    .ok_or_else(|| {
                        KeywordError::invalid(keyword, format!("'{name}' must be a non-negative integer"))
                    })
            }
        }
    }

    pub fn optional_f64(keyword: &str, args: &Vars, name: &str) -> Result<Option<f64>, KeywordError> {
        match args.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| KeywordError::invalid(keyword, format!("'{name}' must be a number"))),
            Some(_) => Err(KeywordError::invalid(keyword, format!("'{name}' must be a number"))),
        }
    }
}
