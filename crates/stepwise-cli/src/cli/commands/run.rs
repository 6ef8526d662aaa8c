use std::sync::Arc;

use stepwise_core::report::console::{default_progress_sink, print_summary};
use stepwise_core::report::json::write_json;
use stepwise_core::{EngineError, Runner};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::super::args::RunArgs;
use super::runner_builder::{
    apply_run_overrides, build_registry, load_cases, resolve_config, seed_context,
};
use crate::exit_codes;

pub(crate) async fn run(args: RunArgs, verbose: bool) -> anyhow::Result<i32> {
    let mut cfg = match resolve_config(&args.source) {
        Ok(cfg) => cfg,
        Err(e) => return Ok(engine_error_exit(&e)),
    };
    apply_run_overrides(&mut cfg, &args);

    let registry = Arc::new(build_registry(&cfg));
    let context = seed_context(&cfg, &args.vars);
    let cases = match load_cases(&cfg, &registry, &context, &args.vars) {
        Ok(cases) => cases,
        Err(e) => return Ok(engine_error_exit(&e)),
    };
    info!(cases = cases.len(), concurrency = cfg.concurrency, "starting run");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight steps");
            on_signal.cancel();
        }
    });

    let runner = Runner::new(registry, context).with_policy(cfg.run_policy());
    let progress = default_progress_sink(cases.len());
    let suite = match runner.run_suite(cases.into(), &cancel, progress).await {
        Ok(suite) => suite,
        Err(e) => return Ok(engine_error_exit(&e)),
    };

    print_summary(&suite, verbose);
    if let Some(path) = &args.json {
        write_json(&suite, path)?;
        info!(path = %path.display(), "wrote JSON report");
    }

    Ok(if suite.cancelled {
        exit_codes::CANCELLED
    } else if suite.all_passed() {
        exit_codes::SUCCESS
    } else {
        exit_codes::CASES_FAILED
    })
}

pub(crate) fn engine_error_exit(e: &EngineError) -> i32 {
    eprintln!("error [{}]: {}", e.reason_code(), e);
    match e {
        EngineError::ResourceExhausted(_) => exit_codes::RESOURCE_EXHAUSTED,
        _ => exit_codes::CONFIG_ERROR,
    }
}
