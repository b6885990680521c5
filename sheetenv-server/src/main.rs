//! HTTP transport for the spreadsheet environment.
//!
//! One environment per process; requests are serialized through its lock.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sheetenv::episode::SpreadsheetEnv;
use sheetenv::io::config::load_config_with_env;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "sheetenv-server")]
#[command(about = "Serve a spreadsheet environment over HTTP")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Environment config (TOML). Missing files fall back to defaults.
    #[arg(long, default_value = "sheetenv.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sheetenv::logging::init("sheetenv_server=info,sheetenv=info");

    let args = Args::parse();
    let config = load_config_with_env(&args.config)?;
    info!(
        config = %args.config.display(),
        base_document = ?config.base_document,
        output_document = ?config.output_document,
        "starting sheetenv-server"
    );

    let state = AppState::new(SpreadsheetEnv::in_memory(config));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(state.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind, args.port))?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Persist the final document and release the engine before exiting.
    match state.with_env(|env| env.close()).await {
        Ok(observation) => info!(result = %observation.result, "environment closed"),
        Err(err) => warn!(err = %err, "failed to close environment on shutdown"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(err = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
