use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::report::{Status, SuiteResult};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Progress line for display. Deterministic, unit-testable.
#[must_use]
pub fn format_progress_line(done: usize, total: usize) -> String {
    format!("Running case {}/{}...", done, total)
}

pub fn emit_progress_line(line: &str) {
    eprintln!("{}", line);
}

/// Minimum interval between progress updates.
const PROGRESS_MIN_INTERVAL_MS: u64 = 200;

/// For large suites, emit at most every this many cases (10% steps).
pub(crate) fn progress_step(total: usize) -> usize {
    if total <= 10 {
        1
    } else {
        std::cmp::max(1, total / 10)
    }
}

/// Throttled stderr progress sink. `None` for suites of zero or one case.
/// The final event (`done == total`) is always printed.
pub fn default_progress_sink(total: usize) -> Option<ProgressSink> {
    if total <= 1 {
        return None;
    }
    let step = progress_step(total);
    let last_emit: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    Some(Arc::new(move |ev: ProgressEvent| {
        if ev.total == 0 {
            return;
        }
        let now = Instant::now();
        let should_emit = {
            let mut last = last_emit.lock().unwrap_or_else(PoisonError::into_inner);
            let emit_final = ev.done == ev.total;
            let emit_step = ev.done.is_multiple_of(step) || ev.done == 1;
            let interval_ok = last.map_or(true, |t| {
                now.saturating_duration_since(t) >= Duration::from_millis(PROGRESS_MIN_INTERVAL_MS)
            });
            let ok = emit_final || (emit_step && interval_ok);
            if ok {
                *last = Some(now);
            }
            ok
        };
        if should_emit {
            emit_progress_line(&format_progress_line(ev.done, ev.total));
        }
    }))
}

fn icon(status: Status) -> &'static str {
    match status {
        Status::Success => "✅",
        Status::Failed => "❌",
        Status::Error => "💥",
        Status::Skipped | Status::Pending => "⏭️ ",
    }
}

pub fn print_summary(suite: &SuiteResult, verbose: bool) {
    eprintln!();
    for case in &suite.cases {
        let duration = format!("({:.1}s)", case.duration_ms as f64 / 1000.0);
        match case.status {
            Status::Success => {
                eprintln!("{} {:<30} {}", icon(case.status), case.name, duration);
            }
            Status::Failed | Status::Error => {
                let label = if case.status == Status::Error { "ERROR" } else { "FAILED" };
                eprintln!("{} {:<30} {} {}", icon(case.status), case.name, label, duration);
                if let Some(msg) = &case.message {
                    eprintln!("    {}", msg);
                }
                if let (Some(step), Some(keyword)) = (&case.last_step, &case.failing_keyword) {
                    eprintln!("    at step '{}' ({})", step, keyword);
                }
            }
            Status::Skipped | Status::Pending => {
                eprintln!(
                    "{} {:<30} SKIPPED ({})",
                    icon(case.status),
                    case.name,
                    case.message.as_deref().unwrap_or("not run")
                );
            }
        }
        if verbose {
            for step in &case.steps {
                eprintln!(
                    "      {} {} [{}] {}ms",
                    icon(step.status),
                    step.label,
                    step.keyword,
                    step.duration_ms
                );
            }
        }
        for warning in &case.warnings {
            eprintln!("    ⚠️  {}", warning);
        }
    }

    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    eprintln!(
        "Summary: {} passed, {} failed, {} error, {} skipped ({} total, pass rate {:.1}%)",
        suite.passed,
        suite.failed,
        suite.errored,
        suite.skipped,
        suite.total,
        suite.pass_rate * 100.0
    );
    if suite.cancelled {
        eprintln!("Run was cancelled; cases that had not started are not reported.");
    }
}
