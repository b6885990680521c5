//! Diagnostic tracing for the environment binaries.
//!
//! Tracing is for operators and developers only. It is controlled by
//! `RUST_LOG`, written to stderr, and never part of an observation.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Falls back to `default_filter` if unset or invalid.
/// Output: stderr, compact format. Calling it twice is harmless.
///
/// # Example
/// ```bash
/// RUST_LOG=sheetenv=debug sheetenv run actions.jsonl
/// ```
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
