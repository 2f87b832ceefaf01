//! testforge library crate
//!
//! Exposes the pipeline pieces so the CLI, integration tests and
//! benchmarks can drive them without going through process startup.

pub mod acquire;
pub mod ai;
pub mod analysis;
pub mod catalog;
pub mod config;
pub mod error;
pub mod execute;
pub mod generate;
pub mod logging;
pub mod pipeline;
pub mod task;
pub mod util;
