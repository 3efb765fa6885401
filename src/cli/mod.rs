//! CLI command handlers

pub mod commands;

pub use commands::{grid, inspect, run, suggest};
