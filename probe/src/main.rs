mod cli;
mod client;
mod outcome;
mod report;
mod scenario;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "probe", version, about = "Walkthrough checks for the spreadsheet environment")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay the walkthrough against a running server.
    Run {
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        url: String,
        /// Directory for save/export targets, as seen by the server.
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Write a JSON report here.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Replay the walkthrough against an in-process environment.
    Local {
        #[arg(long, default_value = "sheetenv.toml")]
        config: PathBuf,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print a running server's episode state.
    State {
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        url: String,
    },
}

fn main() -> Result<()> {
    sheetenv::logging::init("probe=info");
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run {
            url,
            workdir,
            report,
        } => cli::run_remote(&url, workdir.as_deref(), report.as_deref())?,
        Command::Local { config, report } => cli::run_local(&config, report.as_deref())?,
        Command::State { url } => cli::show_state(&url)?,
    };
    std::process::exit(code);
}
