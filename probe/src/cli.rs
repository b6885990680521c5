//! CLI command implementations.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use sheetenv::episode::SpreadsheetEnv;
use sheetenv::io::config::load_config_with_env;
use tracing::{info, warn};

use crate::client::EnvClient;
use crate::outcome::EXIT_UNREACHABLE;
use crate::report::{ProbeReport, render_lines, write_report};
use crate::scenario::{StepTarget, run_walkthrough};

/// Run the walkthrough against a server at `url`.
pub fn run_remote(url: &str, workdir: Option<&Path>, report_path: Option<&Path>) -> Result<i32> {
    let mut client = EnvClient::new(url)?;
    if let Err(err) = client.health() {
        eprintln!("probe: {url} is not reachable: {err:#}");
        return Ok(EXIT_UNREACHABLE);
    }
    let scratch = tempfile::tempdir().context("create scratch directory")?;
    let workdir = workdir.unwrap_or(scratch.path());
    run_and_report(url, &mut client, workdir, report_path)
}

/// Run the walkthrough against an in-process environment.
pub fn run_local(config_path: &Path, report_path: Option<&Path>) -> Result<i32> {
    let config = load_config_with_env(config_path)?;
    let mut env = SpreadsheetEnv::in_memory(config);
    let scratch = tempfile::tempdir().context("create scratch directory")?;
    run_and_report("local", &mut env, scratch.path(), report_path)
}

/// Print the episode state of a running server.
pub fn show_state(url: &str) -> Result<i32> {
    let client = EnvClient::new(url)?;
    let state = client.state()?;
    println!(
        "state: episode_id={} step_count={} resets={}",
        state.episode_id, state.step_count, state.resets
    );
    Ok(0)
}

fn run_and_report(
    target_label: &str,
    target: &mut dyn StepTarget,
    workdir: &Path,
    report_path: Option<&Path>,
) -> Result<i32> {
    info!(target = target_label, workdir = %workdir.display(), "starting walkthrough");
    let started_at = Utc::now();
    let checks = run_walkthrough(target, workdir)?;
    let finished_at = Utc::now();

    let report = ProbeReport::new(target_label, checks, started_at, finished_at);
    for line in render_lines(&report) {
        println!("{line}");
    }
    if let Some(path) = report_path {
        match write_report(path, &report) {
            Ok(()) => info!(path = %path.display(), "report written"),
            Err(err) => warn!(path = %path.display(), err = %format!("{err:#}"), "failed to write report"),
        }
    }
    Ok(report.outcome.exit_code())
}
