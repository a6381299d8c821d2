use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vt_cli::commands::{log, run, sessions, totals};
use vt_cli::{Cli, Commands, Config};
use vt_core::UserId;

fn ensure_database_dir(config: &Config) -> Result<()> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Ok(())
}

/// Opens the configured database, creating its directory if needed.
fn open_database(config: &Config) -> Result<vt_db::Database> {
    ensure_database_dir(config)?;
    vt_db::Database::open(&config.database_path).context("failed to open database")
}

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn parse_user(user: Option<&str>) -> Result<Option<UserId>> {
    user.map(UserId::new)
        .transpose()
        .context("invalid --user value")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so report output on stdout stays clean
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut stdout = std::io::stdout();
    match &cli.command {
        Some(Commands::Run) => {
            let config = load_config(cli.config.as_deref())?;
            ensure_database_dir(&config)?;
            run::run(&config).await?;
        }
        Some(Commands::Totals { json }) => {
            let config = load_config(cli.config.as_deref())?;
            let db = open_database(&config)?;
            totals::run(&mut stdout, &db, *json)?;
        }
        Some(Commands::Log { user, limit }) => {
            let config = load_config(cli.config.as_deref())?;
            let db = open_database(&config)?;
            let user = parse_user(user.as_deref())?;
            log::run(&mut stdout, &db, user.as_ref(), *limit)?;
        }
        Some(Commands::Sessions { user }) => {
            let config = load_config(cli.config.as_deref())?;
            let db = open_database(&config)?;
            let user = parse_user(user.as_deref())?;
            sessions::run(&mut stdout, &db, user.as_ref(), chrono::Utc::now())?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
