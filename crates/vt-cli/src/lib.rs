//! Voice channel time tracker CLI library.
//!
//! This crate provides the `vt` binary: configuration, the Discord gateway
//! adapter and the reporting subcommands.

mod cli;
pub mod commands;
mod config;
pub mod discord;
pub mod messages;

pub use cli::{Cli, Commands};
pub use config::Config;
