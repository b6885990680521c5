//! Command-line driver for the spreadsheet environment.
//!
//! `run` replays a JSON-lines script of actions against a fresh episode and
//! prints one response per line. `commands` lists the registry.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sheetenv::core::types::{Action, Observation, StepResponse};
use sheetenv::episode::SpreadsheetEnv;
use sheetenv::exit_codes;
use sheetenv::io::config::load_config_with_env;
use sheetenv::registry::CommandRegistry;

#[derive(Parser)]
#[command(
    name = "sheetenv",
    version,
    about = "Spreadsheet document exposed as a reset/step/close environment"
)]
struct Cli {
    /// Config file (TOML). Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "sheetenv.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reset, replay every action in a JSON-lines script, then close.
    Run {
        /// One action object per line. Blank lines and `#` comments are skipped.
        script: PathBuf,
    },
    /// Print the command registry as JSON.
    Commands,
}

fn main() {
    sheetenv::logging::init("warn");
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { script } => cmd_run(&cli.config, &script),
        Command::Commands => cmd_commands(),
    }
}

fn cmd_run(config_path: &Path, script: &Path) -> Result<i32> {
    let config = load_config_with_env(config_path)?;
    let actions = read_script(script)?;

    let mut env = SpreadsheetEnv::in_memory(config);
    let reset = env.reset();
    print_response(reset.clone())?;
    if !reset.success {
        return Ok(exit_codes::ENGINE_UNAVAILABLE);
    }

    let mut failed = 0usize;
    for action in &actions {
        let observation = env.step(action);
        if !observation.success {
            failed += 1;
        }
        print_response(observation)?;
    }
    print_response(env.close())?;

    if failed > 0 {
        tracing::warn!(failed, total = actions.len(), "script finished with failed steps");
        return Ok(exit_codes::STEP_FAILED);
    }
    Ok(exit_codes::OK)
}

fn cmd_commands() -> Result<i32> {
    let registry = CommandRegistry::standard();
    let specs: Vec<_> = registry.specs().collect();
    let payload = serde_json::to_string_pretty(&specs).context("serialize command list")?;
    println!("{payload}");
    Ok(exit_codes::OK)
}

/// Parse a JSON-lines script. Errors name the offending line.
fn read_script(path: &Path) -> Result<Vec<Action>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut actions = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let action: Action = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid action", path.display(), index + 1))?;
        actions.push(action);
    }
    Ok(actions)
}

fn print_response(observation: Observation) -> Result<()> {
    let response = StepResponse::from(observation);
    let line = serde_json::to_string(&response).context("serialize response")?;
    println!("{line}");
    Ok(())
}
