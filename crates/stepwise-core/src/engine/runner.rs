use crate::condition;
use crate::context::{self, CaseScope, ContextStore};
use crate::engine::hooks::{self, HookFailure};
use crate::errors::{EngineError, KeywordError, StepError};
use crate::keyword::KeywordRegistry;
use crate::model::{Case, Step};
use crate::render;
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::report::{aggregate, CaseResult, Status, StepResult, SuiteResult};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct RunPolicy {
    /// Maximum number of cases executing at once.
    pub concurrency: usize,
    /// Publish step outputs to the global tier, where later cases see them.
    pub promote_outputs: bool,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            concurrency: 1,
            promote_outputs: true,
        }
    }
}

/// Lifecycle of one case execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Errored,
}

impl CaseState {
    fn status(self) -> Status {
        match self {
            CaseState::Pending => Status::Pending,
            CaseState::Running => Status::Skipped,
            CaseState::Succeeded => Status::Success,
            CaseState::Failed => Status::Failed,
            CaseState::Errored => Status::Error,
        }
    }
}

/// Phase of one step, reported in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Rendering,
    Dispatching,
    Recorded,
}

#[derive(Clone)]
pub struct Runner {
    pub registry: Arc<KeywordRegistry>,
    pub context: ContextStore,
    pub policy: RunPolicy,
}

impl Runner {
    pub fn new(registry: Arc<KeywordRegistry>, context: ContextStore) -> Self {
        Self {
            registry,
            context,
            policy: RunPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs every case on a bounded worker pool.
    ///
    /// Results are collected in completion order and sorted back into suite
    /// order. Once `cancel` fires no further case or step is started; cases
    /// that never started are absent from the result. Only resource
    /// exhaustion aborts the run with an error. Cases are shared read-only
    /// with the worker tasks.
    pub async fn run_suite(
        &self,
        cases: Arc<[Case]>,
        cancel: &CancellationToken,
        progress: Option<ProgressSink>,
    ) -> Result<SuiteResult, EngineError> {
        let total = cases.len();
        let parallel = self.policy.concurrency.max(1);
        let sem = Arc::new(Semaphore::new(parallel));
        // fires on external cancellation or on a fatal case error
        let halt = cancel.child_token();
        let mut join_set = JoinSet::new();
        let mut task_cases: HashMap<tokio::task::Id, (usize, String)> = HashMap::new();

        info!(cases = total, concurrency = parallel, "suite started");
        let suite_timer = Instant::now();

        for index in 0..total {
            let permit = tokio::select! {
                biased;
                _ = halt.cancelled() => break,
                permit = sem.clone().acquire_owned() => permit.map_err(|e| {
                    EngineError::ResourceExhausted(format!("worker pool closed: {e}"))
                })?,
            };
            if halt.is_cancelled() {
                break;
            }
            let this = self.clone();
            let cases = Arc::clone(&cases);
            let halt = halt.clone();
            let name = cases[index].name.clone();
            let handle = join_set.spawn(async move {
                let _permit = permit;
                let outcome = this.execute_case(index, &cases[index], &halt).await;
                if outcome.is_err() {
                    halt.cancel();
                }
                outcome
            });
            task_cases.insert(handle.id(), (index, name));
        }

        let mut rows = Vec::new();
        let mut fatal: Option<EngineError> = None;
        let mut done = 0;
        while let Some(joined) = join_set.join_next_with_id().await {
            done += 1;
            match joined {
                Ok((_, Ok(Some(row)))) => rows.push(row),
                Ok((_, Ok(None))) => {}
                Ok((_, Err(e))) => {
                    error!(error = %e, code = e.reason_code(), "suite aborted");
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    let (index, name) = task_cases
                        .get(&e.id())
                        .cloned()
                        .unwrap_or((usize::MAX, "unknown".to_string()));
                    error!(case = %name, error = %e, "case task panicked");
                    rows.push(crashed_case(index, name, e.to_string()));
                }
            }
            if let Some(ref sink) = progress {
                sink(ProgressEvent { done, total });
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        rows.sort_by_key(|r| r.index);
        let cancelled = cancel.is_cancelled();
        let suite = aggregate(rows, cancelled);
        info!(
            total = suite.total,
            passed = suite.passed,
            failed = suite.failed,
            errored = suite.errored,
            cancelled,
            wall_ms = suite_timer.elapsed().as_millis() as u64,
            "suite finished"
        );
        Ok(suite)
    }

    /// Runs a single case outside a suite.
    pub async fn run_case(
        &self,
        case: &Case,
        cancel: &CancellationToken,
    ) -> Result<CaseResult, EngineError> {
        match self.execute_case(0, case, cancel).await? {
            Some(result) => Ok(result),
            None => Ok(CaseResult {
                name: case.name.clone(),
                index: 0,
                status: Status::Skipped,
                started_at: Utc::now(),
                duration_ms: 0,
                message: Some("cancelled before start".to_string()),
                last_step: None,
                failing_keyword: None,
                steps: Vec::new(),
                warnings: Vec::new(),
                source: case.source.clone(),
            }),
        }
    }

    /// `None` when cancellation was observed before the case started.
    #[instrument(name = "case", skip_all, fields(case = %case.name))]
    async fn execute_case(
        &self,
        index: usize,
        case: &Case,
        cancel: &CancellationToken,
    ) -> Result<Option<CaseResult>, EngineError> {
        if cancel.is_cancelled() {
            debug!("cancelled before start");
            return Ok(None);
        }

        let started_at = Utc::now();
        let timer = Instant::now();
        let mut state = CaseState::Pending;
        let mut scope = CaseScope::new(&self.context, &case.context);
        let mut steps = Vec::with_capacity(case.steps.len());
        let mut message = None;
        let mut last_step = None;
        let mut failing_keyword = None;

        debug!(?state, "case pending");
        match hooks::run_pre_hooks(&case.pre_hooks, &mut scope, &self.registry).await {
            Ok(()) => state = CaseState::Running,
            Err(HookFailure::Fatal(e)) => return Err(e),
            Err(HookFailure::Step(err)) => {
                warn!(error = %err, "pre-hook failed; steps not run");
                state = CaseState::Errored;
                message = Some(err.to_string());
            }
        }

        if state == CaseState::Running {
            info!(steps = case.steps.len(), "case started");
            for step in &case.steps {
                if cancel.is_cancelled() {
                    info!(step = %step.label, "cancelled before step");
                    message.get_or_insert_with(|| format!("cancelled before step '{}'", step.label));
                    break;
                }
                scope.refresh(&self.context);
                let result = self.execute_step(step, &mut scope).await?;
                last_step = Some(step.label.clone());

                let failed = result.status.is_failure();
                if failed && failing_keyword.is_none() {
                    failing_keyword = Some(step.keyword.clone());
                    message = result.message.clone();
                }
                steps.push(result);

                if failed {
                    state = CaseState::Failed;
                    if !case.continues_after(step) {
                        debug!(step = %step.label, "stopping after failed step");
                        break;
                    }
                }
            }
            // a case interrupted by cancellation stays Running and reports as skipped
            if state == CaseState::Running && steps.len() == case.steps.len() {
                state = CaseState::Succeeded;
            }
        }

        let mut warnings = Vec::new();
        for err in hooks::run_post_hooks(&case.post_hooks, &mut scope, &self.registry).await? {
            warn!(error = %err, "post-hook failed");
            warnings.push(err.to_string());
        }

        let status = state.status();
        let duration_ms = timer.elapsed().as_millis() as u64;
        info!(status = %status, duration_ms, "case finished");

        Ok(Some(CaseResult {
            name: case.name.clone(),
            index,
            status,
            started_at,
            duration_ms,
            message,
            last_step,
            failing_keyword,
            steps,
            warnings,
            source: case.source.clone(),
        }))
    }

    /// Renders, dispatches and records one step. Handler failures become a
    /// failed `StepResult`; only a lost provider is returned as an error.
    async fn execute_step(
        &self,
        step: &Step,
        scope: &mut CaseScope,
    ) -> Result<StepResult, EngineError> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let mut record = StepResult {
            label: step.label.clone(),
            keyword: step.keyword.clone(),
            status: Status::Pending,
            started_at,
            duration_ms: 0,
            arguments: Default::default(),
            output: None,
            message: None,
            attachments: Vec::new(),
        };

        debug!(step = %step.label, phase = ?StepPhase::Rendering);
        let vars = scope.vars();
        if let Some(cond) = &step.when {
            match condition::evaluate(cond, &vars) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(step = %step.label, condition = %cond, "step skipped");
                    record.status = Status::Skipped;
                    record.message = Some(format!("condition is false: {cond}"));
                    return Ok(record);
                }
                Err(e) => {
                    record.status = Status::Failed;
                    record.message = Some(format!("invalid condition '{cond}': {e}"));
                    record.duration_ms = timer.elapsed().as_millis() as u64;
                    return Ok(record);
                }
            }
        }
        record.arguments = render::render_map(&step.arguments, &vars);

        debug!(step = %step.label, keyword = %step.keyword, phase = ?StepPhase::Dispatching);
        let outcome = self
            .registry
            .invoke(&step.keyword, record.arguments.clone())
            .await;
        record.duration_ms = timer.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                let mut outputs = output.outputs;
                if let Some(name) = &step.save_as {
                    outputs.insert(name.clone(), output.value.clone().unwrap_or(Value::Null));
                }
                scope.record_outputs(&outputs);
                if self.policy.promote_outputs {
                    context::promote(&self.context, &outputs);
                }
                record.status = Status::Success;
                record.output = output.value;
                record.attachments = output.attachments;
            }
            Err(KeywordError::ProviderUnavailable(reason)) => {
                return Err(EngineError::ResourceExhausted(format!(
                    "step '{}' ({}): {reason}",
                    step.label, step.keyword
                )));
            }
            Err(source) => {
                let err = StepError::HandlerError {
                    label: step.label.clone(),
                    keyword: step.keyword.clone(),
                    source,
                };
                warn!(error = %err, "step failed");
                record.status = Status::Failed;
                record.message = Some(err.to_string());
            }
        }
        debug!(
            step = %step.label,
            status = %record.status,
            duration_ms = record.duration_ms,
            phase = ?StepPhase::Recorded
        );
        Ok(record)
    }
}

fn crashed_case(index: usize, name: String, reason: String) -> CaseResult {
    CaseResult {
        name,
        index,
        status: Status::Error,
        started_at: Utc::now(),
        duration_ms: 0,
        message: Some(format!("case task failed: {reason}")),
        last_step: None,
        failing_keyword: None,
        steps: Vec::new(),
        warnings: Vec::new(),
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::{Handler, KeywordOutput};
    use crate::model::{HookAction, Vars};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runner_with(registry: KeywordRegistry) -> Runner {
        Runner::new(Arc::new(registry), ContextStore::new())
    }

    fn passing() -> Step {
        Step::new("ok", "log").arg("message", "fine")
    }

    fn failing(label: &str) -> Step {
        Step::new(label, "fail").arg("message", "boom")
    }

    #[tokio::test]
    async fn stop_on_failure_records_nothing_after_first_failure() -> anyhow::Result<()> {
        let runner = runner_with(KeywordRegistry::with_builtins());
        let case = Case::new("strict", vec![passing(), failing("bad"), passing()]);
        let result = runner.run_case(&case, &CancellationToken::new()).await?;
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.last_step.as_deref(), Some("bad"));
        assert_eq!(result.failing_keyword.as_deref(), Some("fail"));
        assert!(result.message.as_deref().unwrap_or_default().contains("boom"));
        Ok(())
    }

    #[tokio::test]
    async fn continue_on_error_keeps_going_but_still_fails() -> anyhow::Result<()> {
        let runner = runner_with(KeywordRegistry::with_builtins());
        let case = Case::new(
            "lenient",
            vec![failing("bad").continue_on_error(true), passing()],
        );
        let result = runner.run_case(&case, &CancellationToken::new()).await?;
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[1].status, Status::Success);
        Ok(())
    }

    #[tokio::test]
    async fn pre_hook_failure_errors_case_without_running_steps() -> anyhow::Result<()> {
        let runner = runner_with(KeywordRegistry::with_builtins());
        let mut case = Case::new("hooked", vec![passing()]);
        case.pre_hooks = vec![HookAction::Invoke(Step::new("setup", "fail"))];
        let result = runner.run_case(&case, &CancellationToken::new()).await?;
        assert_eq!(result.status, Status::Error);
        assert!(result.steps.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn post_hook_failure_keeps_success() -> anyhow::Result<()> {
        let runner = runner_with(KeywordRegistry::with_builtins());
        let mut case = Case::new("cleanup", vec![passing()]);
        case.post_hooks = vec![HookAction::Invoke(Step::new("teardown", "fail").arg("message", "teardown broke"))];
        let result = runner.run_case(&case, &CancellationToken::new()).await?;
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("teardown broke"));
        Ok(())
    }

    #[tokio::test]
    async fn outputs_flow_to_later_steps_and_global_tier() -> anyhow::Result<()> {
        let runner = runner_with(KeywordRegistry::with_builtins());
        let case = Case::new(
            "flow",
            vec![
                Step::new("mint", "set_var").arg("name", "token").arg("value", "abc"),
                Step::new("echo", "log").arg("message", "t=${token}").save_as("echoed"),
            ],
        );
        let result = runner.run_case(&case, &CancellationToken::new()).await?;
        assert_eq!(result.steps[1].arguments.get("message"), Some(&json!("t=abc")));
        assert_eq!(runner.context.get("token"), Some(json!("abc")));
        assert_eq!(runner.context.get("echoed"), Some(json!("t=abc")));
        Ok(())
    }

    #[tokio::test]
    async fn promotion_can_be_disabled() -> anyhow::Result<()> {
        let runner = runner_with(KeywordRegistry::with_builtins()).with_policy(RunPolicy {
            concurrency: 1,
            promote_outputs: false,
        });
        let case = Case::new(
            "private",
            vec![Step::new("mint", "set_var").arg("name", "token").arg("value", "abc")],
        );
        runner.run_case(&case, &CancellationToken::new()).await?;
        assert!(runner.context.get("token").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn false_condition_skips_step() -> anyhow::Result<()> {
        let runner = runner_with(KeywordRegistry::with_builtins());
        let case = Case::new("cond", vec![failing("never").when("${mode} == 'full'"), passing()])
            .with_context(json!({"mode": "smoke"}).as_object().cloned().unwrap_or_default());
        let result = runner.run_case(&case, &CancellationToken::new()).await?;
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.steps[0].status, Status::Skipped);
        assert_eq!(result.steps[1].status, Status::Success);
        Ok(())
    }

    #[tokio::test]
    async fn true_string_condition_runs_step() -> anyhow::Result<()> {
        let runner = runner_with(KeywordRegistry::with_builtins());
        let case = Case::new("cond", vec![failing("gate").when("${mode} == 'full'")])
            .with_context(json!({"mode": "full"}).as_object().cloned().unwrap_or_default());
        let result = runner.run_case(&case, &CancellationToken::new()).await?;
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.steps[0].status, Status::Failed);
        assert_eq!(result.last_step.as_deref(), Some("gate"));
        Ok(())
    }

    #[tokio::test]
    async fn condition_values_may_contain_whitespace() -> anyhow::Result<()> {
        let runner = runner_with(KeywordRegistry::with_builtins());
        runner.context.set("user", json!("bob smith"));
        let case = Case::new(
            "cond",
            vec![
                passing().when("${user} == 'bob smith' and '${user}' contains 'smith'"),
                failing("other user").when("${user} == 'alice'"),
            ],
        );
        let result = runner.run_case(&case, &CancellationToken::new()).await?;
        assert_eq!(result.status, Status::Success, "{:?}", result.message);
        assert_eq!(result.steps[0].status, Status::Success);
        assert_eq!(result.steps[1].status, Status::Skipped);
        Ok(())
    }

    #[tokio::test]
    async fn provider_loss_aborts_suite() {
        let registry = KeywordRegistry::new();
        registry.register(
            "drive",
            Handler::sync(|_| Err(KeywordError::ProviderUnavailable("browser crashed".into()))),
        );
        let runner = runner_with(registry);
        let cases = vec![Case::new("a", vec![Step::new("go", "drive")])];
        let err = runner
            .run_suite(cases.into(), &CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ResourceExhausted(_)));
    }

    #[tokio::test]
    async fn progress_reports_every_case() -> anyhow::Result<()> {
        let runner = runner_with(KeywordRegistry::with_builtins());
        let seen = Arc::new(AtomicUsize::new(0));
        let sink_seen = seen.clone();
        let sink: ProgressSink = Arc::new(move |ev: ProgressEvent| {
            assert_eq!(ev.total, 3);
            sink_seen.fetch_add(1, Ordering::SeqCst);
        });
        let cases: Arc<[Case]> = (0..3).map(|i| Case::new(format!("c{i}"), vec![passing()])).collect();
        let suite = runner
            .run_suite(Arc::clone(&cases), &CancellationToken::new(), Some(sink))
            .await?;
        assert_eq!(suite.passed, 3);
        // workers only borrowed the shared slice
        assert_eq!(Arc::strong_count(&cases), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn sync_handler_sees_rendered_arguments() -> anyhow::Result<()> {
        let registry = KeywordRegistry::new();
        registry.register(
            "echo",
            Handler::sync(|args: &Vars| Ok(KeywordOutput::value(Value::Object(args.clone())))),
        );
        let runner = runner_with(registry);
        runner.context.set("who", json!("world"));
        let case = Case::new("echo", vec![Step::new("e", "echo").arg("greeting", "hello ${who}")]);
        let result = runner.run_case(&case, &CancellationToken::new()).await?;
        assert_eq!(result.steps[0].output, Some(json!({"greeting": "hello world"})));
        Ok(())
    }
}
