//! The canonical walkthrough: a fixed sequence of actions with a check on
//! each observation.
//!
//! Runs against anything implementing [`StepTarget`]: a remote server via
//! [`EnvClient`] or an in-process [`SpreadsheetEnv`].

use std::path::Path;

use anyhow::Result;
use serde_json::{Value, json};
use sheetenv::core::types::{Action, EpisodeState, Observation};
use sheetenv::episode::SpreadsheetEnv;
use tracing::debug;

use crate::client::EnvClient;
use crate::outcome::CheckResult;

/// Something that accepts reset/step/state/close. Transport failures are
/// `Err`; command failures are observations with `success == false`.
pub trait StepTarget {
    fn reset(&mut self) -> Result<Observation>;
    fn step(&mut self, action: &Action) -> Result<Observation>;
    fn state(&mut self) -> Result<EpisodeState>;
    fn close(&mut self) -> Result<Observation>;
}

impl StepTarget for EnvClient {
    fn reset(&mut self) -> Result<Observation> {
        EnvClient::reset(self)
    }

    fn step(&mut self, action: &Action) -> Result<Observation> {
        EnvClient::step(self, action)
    }

    fn state(&mut self) -> Result<EpisodeState> {
        EnvClient::state(self)
    }

    fn close(&mut self) -> Result<Observation> {
        EnvClient::close(self)
    }
}

impl StepTarget for SpreadsheetEnv {
    fn reset(&mut self) -> Result<Observation> {
        Ok(SpreadsheetEnv::reset(self))
    }

    fn step(&mut self, action: &Action) -> Result<Observation> {
        Ok(SpreadsheetEnv::step(self, action))
    }

    fn state(&mut self) -> Result<EpisodeState> {
        Ok(SpreadsheetEnv::state(self))
    }

    fn close(&mut self) -> Result<Observation> {
        Ok(SpreadsheetEnv::close(self))
    }
}

struct Walkthrough<'a> {
    target: &'a mut dyn StepTarget,
    checks: Vec<CheckResult>,
    steps: u64,
}

impl Walkthrough<'_> {
    fn step(&mut self, action: Action) -> Result<Observation> {
        self.steps += 1;
        let observation = self.target.step(&action)?;
        debug!(command = %action.command, success = observation.success, "walkthrough step");
        Ok(observation)
    }

    fn check(&mut self, name: &'static str, passed: bool, detail: impl Into<String>) {
        self.checks.push(CheckResult {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        });
    }

    /// Check that a step succeeded; the failure detail is the error message.
    fn expect_success(&mut self, name: &'static str, observation: &Observation) {
        let detail = observation
            .error_message
            .clone()
            .unwrap_or_else(|| observation.result.clone());
        self.check(name, observation.success, detail);
    }
}

/// Replay the walkthrough. `workdir` is where save/export targets are
/// written (as seen by the environment's host).
pub fn run_walkthrough(target: &mut dyn StepTarget, workdir: &Path) -> Result<Vec<CheckResult>> {
    let mut run = Walkthrough {
        target,
        checks: Vec::new(),
        steps: 0,
    };

    let reset = run.target.reset()?;
    run.expect_success("reset", &reset);
    if !reset.success {
        return Ok(run.checks);
    }
    let first_episode = reset.metadata.get("episode_id").cloned();

    let rows = json!([["Name", "Age", "City"], ["Alice", 25, "NY"], ["Bob", 30, "SF"]]);
    let obs = run.step(Action::new("set_range").with("range", "A1:C3").with("values", rows))?;
    run.expect_success("write headers and rows", &obs);

    let obs = run.step(Action::new("get_cell").with("cell", "A1"))?;
    let value = data_json(&obs);
    run.check("read header text", value == json!("Name"), format!("A1 = {value}"));

    let obs = run.step(Action::new("get_range").with("range", "A1:C3"))?;
    let grid = data_json(&obs);
    run.check(
        "read range keeps numbers",
        grid[1][1] == json!(25.0) && grid[2][0] == json!("Bob"),
        format!("A1:C3 = {grid}"),
    );

    let obs = run.step(Action::new("set_formula").with("cell", "B4").with("formula", "=SUM(B2:B3)"))?;
    run.expect_success("write formula", &obs);

    let obs = run.step(Action::new("get_formula").with("cell", "B4"))?;
    let formula = data_json(&obs);
    run.check(
        "formula reads back literally",
        formula == json!("=SUM(B2:B3)"),
        format!("B4 formula = {formula}"),
    );

    let obs = run.step(Action::new("get_cell").with("cell", "B4"))?;
    let total = data_json(&obs);
    run.check("formula evaluates", total == json!(55.0), format!("B4 = {total}"));

    let obs = run.step(Action::new("add_sheet").with("name", "Summary"))?;
    let has_sheet = obs
        .sheet_names
        .as_ref()
        .is_some_and(|names| names.iter().any(|n| n == "Summary"));
    run.check("add sheet", obs.success && has_sheet, format!("{:?}", obs.sheet_names));

    let obs = run.step(
        Action::new("rename_sheet")
            .with("old_name", "Summary")
            .with("new_name", "Report"),
    )?;
    let renamed = obs
        .sheet_names
        .as_ref()
        .is_some_and(|names| names.iter().any(|n| n == "Report"));
    run.check("rename sheet", obs.success && renamed, format!("{:?}", obs.sheet_names));

    let saved = workdir.join("walkthrough.json");
    let obs = run.step(Action::new("save_file").with("file_path", saved.display().to_string()))?;
    run.expect_success("save document", &obs);

    let exported = workdir.join("walkthrough.csv");
    let obs = run.step(Action::new("export_csv").with("file_path", exported.display().to_string()))?;
    run.expect_success("export csv", &obs);

    let obs = run.step(Action::new("sort_range").with("range", "A1:C3"))?;
    let named = obs
        .error_message
        .as_deref()
        .is_some_and(|msg| msg.contains("sort_range"));
    run.check(
        "unknown command is rejected",
        !obs.success && named,
        obs.error_message.clone().unwrap_or_default(),
    );

    let state = run.target.state()?;
    let expected_steps = run.steps;
    run.check(
        "step count",
        state.step_count == expected_steps,
        format!("step_count = {}, expected {expected_steps}", state.step_count),
    );

    let first = run.target.close()?;
    let second = run.target.close()?;
    run.check(
        "close is repeatable",
        first.success && second.success,
        format!("{} / {}", first.result, second.result),
    );

    let again = run.target.reset()?;
    let fresh = again.metadata.get("episode_id").cloned();
    run.check(
        "reset issues a new episode",
        again.success && fresh.is_some() && fresh != first_episode,
        format!("{first_episode:?} -> {fresh:?}"),
    );
    run.target.close()?;

    Ok(run.checks)
}

fn data_json(observation: &Observation) -> Value {
    observation
        .data
        .as_ref()
        .and_then(|data| serde_json::to_value(data).ok())
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetenv::io::config::EnvConfig;

    #[test]
    fn walkthrough_passes_against_the_in_memory_environment() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = EnvConfig::default();
        config.connect.backoff_ms = 0;
        let mut env = SpreadsheetEnv::in_memory(config);

        let checks = run_walkthrough(&mut env, temp.path()).expect("walkthrough");
        let failed: Vec<_> = checks.iter().filter(|c| !c.passed).collect();
        assert!(failed.is_empty(), "failed checks: {failed:?}");
        assert!(temp.path().join("walkthrough.json").exists());
        assert!(temp.path().join("walkthrough.csv").exists());
    }

    #[test]
    fn walkthrough_stops_after_a_failed_reset() {
        struct Down;
        impl StepTarget for Down {
            fn reset(&mut self) -> Result<Observation> {
                Ok(Observation::failure("Failed to initialize spreadsheet engine", "refused"))
            }
            fn step(&mut self, _action: &Action) -> Result<Observation> {
                anyhow::bail!("step should not be called")
            }
            fn state(&mut self) -> Result<EpisodeState> {
                anyhow::bail!("state should not be called")
            }
            fn close(&mut self) -> Result<Observation> {
                anyhow::bail!("close should not be called")
            }
        }

        let temp = tempfile::tempdir().expect("tempdir");
        let checks = run_walkthrough(&mut Down, temp.path()).expect("walkthrough");
        assert_eq!(checks.len(), 1);
        assert!(!checks[0].passed);
        assert_eq!(checks[0].detail, "refused");
    }
}
