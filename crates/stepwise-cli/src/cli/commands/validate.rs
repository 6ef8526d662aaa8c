use std::sync::Arc;

use super::super::args::ValidateArgs;
use super::run::engine_error_exit;
use super::runner_builder::{build_registry, load_cases, resolve_config, seed_context};
use crate::exit_codes;

/// Loads and expands cases, printing one line per case. Nothing is executed.
pub fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    let outcome = resolve_config(&args.source).and_then(|cfg| {
        let registry = Arc::new(build_registry(&cfg));
        let context = seed_context(&cfg, &[]);
        load_cases(&cfg, &registry, &context, &[])
    });
    let cases = match outcome {
        Ok(cases) => cases,
        Err(e) => return Ok(engine_error_exit(&e)),
    };

    for case in &cases {
        let source = case.source.as_deref().unwrap_or_default();
        println!(
            "{:>3}  {:<30} {} step(s)  {}",
            case.order,
            case.name,
            case.steps.len(),
            source
        );
    }
    println!("{} case(s) OK", cases.len());
    Ok(exit_codes::SUCCESS)
}
