//! Deterministic, pure logic shared by the environment.
//!
//! Core modules must be free of I/O side effects. They shape wire parameters
//! into typed commands, resolve addresses and build observations, and are
//! testable without a spreadsheet engine.

pub mod address;
pub mod command;
pub mod error;
pub mod reward;
pub mod types;
