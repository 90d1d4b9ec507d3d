//! Command-line interface for tripforge.
//!
//! Provides commands for pipeline runs, standalone zone reconciliation,
//! and top-k ranking queries.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
