//! I/O side of the environment: engine capabilities and their backends.

pub mod config;
pub mod connect;
pub mod engine;
pub mod formula;
pub mod memory;
pub mod process;
pub mod storage;
