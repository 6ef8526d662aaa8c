//! Error taxonomy.
//!
//! `EngineError` is the only error that can abort a whole run. Keyword and
//! step failures are caught by the runner and recorded as results.

use crate::model::HookPhase;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("malformed case source {path}: {reason}")]
    MalformedSource { path: String, reason: String },

    #[error("no cases found in {dir}")]
    EmptyCaseSet { dir: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code, used in JSON output and logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            EngineError::MalformedSource { .. } => "E_MALFORMED_SOURCE",
            EngineError::EmptyCaseSet { .. } => "E_EMPTY_CASE_SET",
            EngineError::Config(_) => "E_CONFIG",
            EngineError::ResourceExhausted(_) => "E_RESOURCE_EXHAUSTED",
            EngineError::Io { .. } => "E_IO",
        }
    }

    /// True for errors caused by the inputs (sources, config) rather than by
    /// the environment the run executed in.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, EngineError::ResourceExhausted(_))
    }
}

/// Failure reported by a keyword handler or by keyword resolution.
///
/// Cloneable so that resolution failures can be cached in the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeywordError {
    #[error("unknown keyword: {name}")]
    UnknownKeyword { name: String },

    #[error("invalid arguments for {keyword}: {reason}")]
    InvalidArguments { keyword: String, reason: String },

    #[error("{0}")]
    Failed(String),

    /// The collaborator behind a keyword is gone (driver crashed, pool
    /// exhausted). Aborts the whole run.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl KeywordError {
    pub fn invalid(keyword: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            keyword: keyword.into(),
            reason: reason.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    #[error("step '{label}' ({keyword}) failed: {source}")]
    HandlerError {
        label: String,
        keyword: String,
        #[source]
        source: KeywordError,
    },

    #[error("{phase}-hook #{index} failed: {message}")]
    HookError {
        phase: HookPhase,
        index: usize,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("unexpected token '{found}', expected {expected}")]
    UnexpectedToken { found: String, expected: String },

    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: String },

    #[error("empty condition")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(
            EngineError::malformed("a.yaml", "bad").reason_code(),
            "E_MALFORMED_SOURCE"
        );
        assert_eq!(
            EngineError::EmptyCaseSet { dir: "x".into() }.reason_code(),
            "E_EMPTY_CASE_SET"
        );
        assert_eq!(
            EngineError::ResourceExhausted("pool".into()).reason_code(),
            "E_RESOURCE_EXHAUSTED"
        );
        assert!(!EngineError::ResourceExhausted("pool".into()).is_input_error());
        assert!(EngineError::Config("v".into()).is_input_error());
    }

    #[test]
    fn handler_error_names_step_and_keyword() {
        let err = StepError::HandlerError {
            label: "open login".into(),
            keyword: "navigate".into(),
            source: KeywordError::failed("timeout"),
        };
        let msg = err.to_string();
        assert!(msg.contains("open login"), "{msg}");
        assert!(msg.contains("navigate"), "{msg}");
        assert!(msg.contains("timeout"), "{msg}");
    }
}
