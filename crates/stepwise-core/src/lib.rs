//! Keyword-driven test execution engine.
//!
//! Cases are loaded from a directory of YAML or CSV sources, expanded over
//! their data-driven variants and executed step by step. Each step names a
//! keyword that the [`KeywordRegistry`] resolves to a handler; arguments are
//! rendered against a tiered variable context first.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stepwise_core::{loader, ContextStore, KeywordRegistry, Runner, SourceFormat};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let context = ContextStore::new();
//! let registry = Arc::new(KeywordRegistry::with_builtins());
//! let cases = loader::load("cases".as_ref(), SourceFormat::Yaml, &context)?;
//! let suite = Runner::new(registry, context)
//!     .run_suite(cases.into(), &CancellationToken::new(), None)
//!     .await?;
//! println!("{}/{} passed", suite.passed, suite.total);
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod keyword;
pub mod loader;
pub mod model;
pub mod render;
pub mod report;

pub use config::{load_config, EngineConfig};
pub use context::{CaseScope, ContextStore};
pub use engine::{RunPolicy, Runner};
pub use errors::{ConditionError, EngineError, KeywordError, StepError};
pub use keyword::extension::ExtensionLoader;
pub use keyword::{
    AsyncKeyword, Handler, HandlerKind, KeywordOutput, KeywordProvider, KeywordRegistry,
    KeywordSignature,
};
pub use model::{Case, HookAction, HookPhase, SourceFormat, Step, Vars};
pub use report::{aggregate, CaseResult, Status, StepResult, SuiteResult};
