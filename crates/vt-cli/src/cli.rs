//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Voice channel time tracker.
///
/// Watches one Discord voice channel, logs every join and leave, and keeps a
/// running total of time spent in the channel per user.
#[derive(Debug, Parser)]
#[command(name = "vt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect to Discord and track the configured voice channel.
    Run,

    /// Show cumulative time per user.
    Totals {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the join/leave audit log.
    Log {
        /// Only show entries for this user ID.
        #[arg(long)]
        user: Option<String>,

        /// Show only the most recent N entries.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Reconstruct sessions from the audit log.
    Sessions {
        /// Only show sessions for this user ID.
        #[arg(long)]
        user: Option<String>,
    },
}
