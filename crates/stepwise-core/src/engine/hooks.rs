//! Pre- and post-hook execution.
//!
//! Pre-hooks stop at the first failing action; the case is then errored.
//! Post-hooks run every action regardless and only report failures.

use crate::condition;
use crate::context::CaseScope;
use crate::errors::{EngineError, KeywordError, StepError};
use crate::keyword::KeywordRegistry;
use crate::model::{HookAction, HookPhase};
use crate::render::{render, render_map};
use serde_json::Value;
use tracing::debug;

#[derive(Debug)]
pub(crate) enum HookFailure {
    Step(StepError),
    Fatal(EngineError),
}

pub(crate) async fn run_pre_hooks(
    actions: &[HookAction],
    scope: &mut CaseScope,
    registry: &KeywordRegistry,
) -> Result<(), HookFailure> {
    for (index, action) in actions.iter().enumerate() {
        run_action(HookPhase::Pre, index, action, scope, registry).await?;
    }
    Ok(())
}

/// Returns the failures of individual actions; only resource exhaustion is
/// propagated as an error.
pub(crate) async fn run_post_hooks(
    actions: &[HookAction],
    scope: &mut CaseScope,
    registry: &KeywordRegistry,
) -> Result<Vec<StepError>, EngineError> {
    let mut failures = Vec::new();
    for (index, action) in actions.iter().enumerate() {
        match run_action(HookPhase::Post, index, action, scope, registry).await {
            Ok(()) => {}
            Err(HookFailure::Step(err)) => failures.push(err),
            Err(HookFailure::Fatal(err)) => return Err(err),
        }
    }
    Ok(failures)
}

async fn run_action(
    phase: HookPhase,
    index: usize,
    action: &HookAction,
    scope: &mut CaseScope,
    registry: &KeywordRegistry,
) -> Result<(), HookFailure> {
    let fail = |message: String| {
        HookFailure::Step(StepError::HookError {
            phase,
            index: index + 1,
            message,
        })
    };
    let vars = scope.vars();

    if let Some(cond) = action.condition() {
        match condition::evaluate(cond, &vars) {
            Ok(true) => {}
            Ok(false) => {
                debug!(%phase, hook = index + 1, condition = %cond, "hook skipped");
                return Ok(());
            }
            Err(e) => return Err(fail(format!("invalid condition '{cond}': {e}"))),
        }
    }

    match action {
        HookAction::Assign { name, value, .. } => {
            let value = render(value, &vars);
            debug!(%phase, hook = index + 1, variable = %name, "hook assignment");
            scope.set_local(name.clone(), value);
            Ok(())
        }
        HookAction::Invoke(step) => {
            let args = render_map(&step.arguments, &vars);
            match registry.invoke(&step.keyword, args).await {
                Ok(output) => {
                    let mut outputs = output.outputs;
                    if let Some(name) = &step.save_as {
                        outputs.insert(name.clone(), output.value.unwrap_or(Value::Null));
                    }
                    scope.record_outputs(&outputs);
                    debug!(%phase, hook = index + 1, keyword = %step.keyword, "hook keyword done");
                    Ok(())
                }
                Err(KeywordError::ProviderUnavailable(reason)) => {
                    Err(HookFailure::Fatal(EngineError::ResourceExhausted(format!(
                        "{phase}-hook keyword {}: {reason}",
                        step.keyword
                    ))))
                }
                Err(e) => Err(fail(format!("{} ({}): {e}", step.label, step.keyword))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextStore;
    use crate::keyword::{Handler, KeywordOutput};
    use crate::model::{Step, Vars};
    use serde_json::json;

    fn assign(name: &str, value: Value) -> HookAction {
        HookAction::Assign {
            name: name.into(),
            value,
            when: None,
        }
    }

    #[tokio::test]
    async fn assignments_render_against_scope() {
        let store = ContextStore::new();
        store.set("host", json!("x.test"));
        let mut scope = CaseScope::new(&store, &Vars::new());
        let registry = KeywordRegistry::with_builtins();

        let actions = vec![
            assign("base", json!("http://${host}")),
            HookAction::Assign {
                name: "skipped".into(),
                value: json!(1),
                when: Some("host == 'other'".into()),
            },
            HookAction::Invoke(Step::new("seed", "set_var").arg("name", "token").arg("value", "${base}/t")),
        ];
        run_pre_hooks(&actions, &mut scope, &registry).await.unwrap();

        assert_eq!(scope.lookup("base"), Some(&json!("http://x.test")));
        assert_eq!(scope.lookup("token"), Some(&json!("http://x.test/t")));
        assert!(scope.lookup("skipped").is_none());
        assert!(store.get("base").is_none());
    }

    #[tokio::test]
    async fn templated_string_conditions_compare_values() {
        let store = ContextStore::new();
        let local = json!({"mode": "full", "user": "bob smith"}).as_object().cloned().unwrap();
        let mut scope = CaseScope::new(&store, &local);
        let registry = KeywordRegistry::with_builtins();

        let actions = vec![
            HookAction::Assign {
                name: "full_run".into(),
                value: json!(true),
                when: Some("${mode} == 'full'".into()),
            },
            HookAction::Assign {
                name: "greeting".into(),
                value: json!("hi ${user}"),
                when: Some("${user} == 'bob smith'".into()),
            },
            HookAction::Assign {
                name: "partial_run".into(),
                value: json!(true),
                when: Some("${mode} == 'partial'".into()),
            },
        ];
        run_pre_hooks(&actions, &mut scope, &registry).await.unwrap();

        assert_eq!(scope.lookup("full_run"), Some(&json!(true)));
        assert_eq!(scope.lookup("greeting"), Some(&json!("hi bob smith")));
        assert!(scope.lookup("partial_run").is_none());
    }

    #[tokio::test]
    async fn pre_hooks_stop_at_first_failure() {
        let mut scope = CaseScope::default();
        let registry = KeywordRegistry::with_builtins();
        let actions = vec![
            HookAction::Invoke(Step::new("boom", "fail").arg("message", "no db")),
            assign("after", json!(true)),
        ];
        let err = run_pre_hooks(&actions, &mut scope, &registry).await.unwrap_err();
        let HookFailure::Step(StepError::HookError { phase, index, message }) = err else {
            panic!("expected hook error");
        };
        assert_eq!(phase, HookPhase::Pre);
        assert_eq!(index, 1);
        assert!(message.contains("no db"), "{message}");
        assert!(scope.lookup("after").is_none());
    }

    #[tokio::test]
    async fn post_hooks_run_everything_and_collect_failures() -> anyhow::Result<()> {
        let mut scope = CaseScope::default();
        let registry = KeywordRegistry::with_builtins();
        let actions = vec![
            HookAction::Invoke(Step::new("a", "fail")),
            assign("cleaned", json!(true)),
            HookAction::Invoke(Step::new("b", "nope")),
        ];
        let failures = run_post_hooks(&actions, &mut scope, &registry).await?;
        assert_eq!(failures.len(), 2);
        assert_eq!(scope.lookup("cleaned"), Some(&json!(true)));
        Ok(())
    }

    #[tokio::test]
    async fn provider_loss_in_hook_is_fatal() {
        let mut scope = CaseScope::default();
        let registry = KeywordRegistry::new();
        registry.register(
            "connect",
            Handler::sync(|_| Err(KeywordError::ProviderUnavailable("driver gone".into()))),
        );
        let actions = vec![HookAction::Invoke(Step::new("c", "connect"))];
        let err = run_post_hooks(&actions, &mut scope, &registry).await.unwrap_err();
        assert_eq!(err.reason_code(), "E_RESOURCE_EXHAUSTED");

        let ok = KeywordRegistry::new();
        ok.register("noop", Handler::sync(|_| Ok(KeywordOutput::none())));
        let actions = vec![HookAction::Invoke(Step::new("n", "noop"))];
        assert!(run_post_hooks(&actions, &mut scope, &ok).await.unwrap().is_empty());
    }
}
