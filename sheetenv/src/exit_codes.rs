//! Stable exit codes for the `sheetenv` CLI.

/// Every step succeeded.
pub const OK: i32 = 0;
/// Invalid invocation, config or script.
pub const INVALID: i32 = 1;
/// The script ran but at least one step failed.
pub const STEP_FAILED: i32 = 2;
/// `reset` could not connect to the spreadsheet engine.
pub const ENGINE_UNAVAILABLE: i32 = 3;
