//! Walkthrough reports: one line per check on stdout, optionally a JSON
//! report file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outcome::{CheckResult, Outcome, classify_outcome};

/// Persisted to the `--report` path.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProbeReport {
    /// Server URL, or `local` for the in-process environment.
    pub target: String,
    pub outcome: Outcome,
    pub passed: usize,
    pub failed: usize,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub checks: Vec<CheckResult>,
}

impl ProbeReport {
    pub fn new(
        target: &str,
        checks: Vec<CheckResult>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let passed = checks.iter().filter(|check| check.passed).count();
        Self {
            target: target.to_string(),
            outcome: classify_outcome(&checks),
            passed,
            failed: checks.len() - passed,
            start_time: started_at.to_rfc3339(),
            end_time: finished_at.to_rfc3339(),
            duration_secs: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            checks,
        }
    }
}

/// Lines printed for a report, one per check plus a summary.
pub fn render_lines(report: &ProbeReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .checks
        .iter()
        .map(|check| {
            let label = if check.passed { "PASS" } else { "FAIL" };
            if check.passed || check.detail.is_empty() {
                format!("{label} {}", check.name)
            } else {
                format!("{label} {}: {}", check.name, check.detail)
            }
        })
        .collect();
    lines.push(format!(
        "probe: target={} passed={} failed={} duration_secs={:.2}",
        report.target, report.passed, report.failed, report.duration_secs
    ));
    lines
}

/// Serialize `report` to pretty-printed JSON with trailing newline.
pub fn write_report(path: &Path, report: &ProbeReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut payload = serde_json::to_string_pretty(report).context("serialize report")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
