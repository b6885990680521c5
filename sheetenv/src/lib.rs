//! A spreadsheet document exposed as a reset/step/close environment.
//!
//! A caller issues discrete commands ("actions") against a live document and
//! receives structured results ("observations"). The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (typed commands, address
//!   resolution, observation shaping, reward policy). No I/O.
//! - **[`io`]**: Everything that touches an engine, the filesystem or child
//!   processes, including the bundled in-memory engine and configuration.
//!
//! Orchestration modules ([`registry`], [`handlers`], [`episode`]) route
//! actions to handlers and own the episode lifecycle.

pub mod core;
pub mod episode;
pub mod exit_codes;
pub mod handle;
pub mod handlers;
pub mod io;
pub mod logging;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
