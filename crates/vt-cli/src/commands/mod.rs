//! CLI subcommand implementations.

pub mod log;
pub mod run;
pub mod sessions;
pub mod totals;
