//! Result records and aggregation.

pub mod console;
pub mod json;
pub mod progress;

use crate::model::Vars;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Success,
    Failed,
    Error,
    Skipped,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Error => "error",
            Status::Skipped => "skipped",
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failed | Status::Error)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub label: String,
    pub keyword: String,
    pub status: Status,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Arguments after rendering.
    #[serde(default)]
    pub arguments: Vars,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    /// Position of the case in the loaded suite.
    pub index: usize,
    pub status: Status,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Label of the last step that was dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failing_keyword: Option<String>,
    pub steps: Vec<StepResult>,
    /// Post-hook failures; informational only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl CaseResult {
    pub fn attachments(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .flat_map(|s| s.attachments.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
    /// Sum of case durations.
    pub duration_ms: u64,
    pub pass_rate: f64,
    pub cancelled: bool,
    pub cases: Vec<CaseResult>,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

/// Counts statuses and sums durations. Pass rate is `passed / total`, `0.0`
/// for an empty suite.
pub fn aggregate(cases: Vec<CaseResult>, cancelled: bool) -> SuiteResult {
    let mut suite = SuiteResult {
        total: cases.len(),
        passed: 0,
        failed: 0,
        errored: 0,
        skipped: 0,
        duration_ms: 0,
        pass_rate: 0.0,
        cancelled,
        cases: Vec::new(),
    };
    for case in &cases {
        match case.status {
            Status::Success => suite.passed += 1,
            Status::Failed => suite.failed += 1,
            Status::Error => suite.errored += 1,
            Status::Skipped | Status::Pending => suite.skipped += 1,
        }
        suite.duration_ms = suite.duration_ms.saturating_add(case.duration_ms);
    }
    if suite.total > 0 {
        suite.pass_rate = suite.passed as f64 / suite.total as f64;
    }
    suite.cases = cases;
    suite
}
