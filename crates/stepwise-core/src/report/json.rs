use crate::report::SuiteResult;
use std::path::Path;

pub fn write_json(suite: &SuiteResult, out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let v = serde_json::json!({
        "schema_version": 1,
        "summary": {
            "total": suite.total,
            "passed": suite.passed,
            "failed": suite.failed,
            "errored": suite.errored,
            "skipped": suite.skipped,
            "duration_ms": suite.duration_ms,
            "pass_rate": suite.pass_rate,
            "cancelled": suite.cancelled,
        },
        "cases": suite.cases,
    });
    std::fs::write(out, serde_json::to_string_pretty(&v)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::case_row;
    use crate::report::{aggregate, Status};

    #[test]
    fn writes_summary_and_cases() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("reports/run.json");
        let suite = aggregate(
            vec![case_row("Login-A", Status::Success, 3), case_row("Login-B", Status::Failed, 4)],
            false,
        );
        write_json(&suite, &out)?;

        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
        assert_eq!(v["summary"]["total"], 2);
        assert_eq!(v["summary"]["failed"], 1);
        assert_eq!(v["cases"][0]["name"], "Login-A");
        assert_eq!(v["cases"][1]["status"], "failed");
        Ok(())
    }
}
