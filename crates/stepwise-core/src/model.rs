use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Ordered variable map. Key order follows insertion (`preserve_order`).
pub type Vars = serde_json::Map<String, Value>;

/// A named, immutable test scenario produced by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Vars,
    /// Initial case-local variables.
    #[serde(default)]
    pub context: Vars,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_hooks: Vec<HookAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_hooks: Vec<HookAction>,
    #[serde(default = "default_true")]
    pub stop_on_failure: bool,
    /// Originating file, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Numeric prefix of the originating file.
    #[serde(default)]
    pub order: u64,
}

impl Case {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            metadata: Vars::new(),
            context: Vars::new(),
            steps,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
            stop_on_failure: true,
            source: None,
            order: 0,
        }
    }

    pub fn with_context(mut self, context: Vars) -> Self {
        self.context = context;
        self
    }

    /// Whether a failure of `step` lets the case carry on with the next step.
    pub fn continues_after(&self, step: &Step) -> bool {
        step.continue_on_error.unwrap_or(!self.stop_on_failure)
    }
}

fn default_true() -> bool {
    true
}

/// One action within a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub label: String,
    pub keyword: String,
    #[serde(default)]
    pub arguments: Vars,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
    /// Variable that receives the keyword's result value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
    /// Condition; the step is skipped when it evaluates false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

impl Step {
    pub fn new(label: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            keyword: keyword.into(),
            arguments: Vars::new(),
            continue_on_error: None,
            save_as: None,
            when: None,
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn continue_on_error(mut self, flag: bool) -> Self {
        self.continue_on_error = Some(flag);
        self
    }

    pub fn save_as(mut self, name: impl Into<String>) -> Self {
        self.save_as = Some(name.into());
        self
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.when = Some(condition.into());
        self
    }
}

/// A pre- or post-hook action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookAction {
    /// `name = value`; the rendered value goes to the case-local tier.
    Assign {
        name: String,
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        when: Option<String>,
    },
    /// A keyword invocation, same shape as a step.
    Invoke(Step),
}

impl HookAction {
    pub fn condition(&self) -> Option<&str> {
        match self {
            HookAction::Assign { when, .. } => when.as_deref(),
            HookAction::Invoke(step) => step.when.as_deref(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            HookAction::Assign { name, .. } => format!("assign {name}"),
            HookAction::Invoke(step) => format!("keyword {}", step.keyword),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    Pre,
    Post,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Pre => f.write_str("pre"),
            HookPhase::Post => f.write_str("post"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    #[default]
    Yaml,
    Csv,
}

impl SourceFormat {
    /// File extensions recognised as case sources for this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            SourceFormat::Yaml => &["yaml", "yml"],
            SourceFormat::Csv => &["csv"],
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Yaml => f.write_str("yaml"),
            SourceFormat::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(SourceFormat::Yaml),
            "csv" | "tabular" => Ok(SourceFormat::Csv),
            other => Err(format!(
                "unsupported source format '{other}' (expected yaml or csv)"
            )),
        }
    }
}
