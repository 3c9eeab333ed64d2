use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use hegemon::cli::{handle_command, Commands, DatabaseArgs};
use hegemon::config::{default_config_path, ConfigLoader};
use hegemon::logging;

#[derive(Parser)]
#[command(
    name = "hegemon",
    version,
    about = "Database backup and restore",
    long_about = "Hegemon backs up PostgreSQL, MySQL and SQLite databases into a \
                  local directory, with optional gzip compression and retention \
                  pruning, and restores them from those backups."
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, env = "HEGEMON_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    database: DatabaseArgs,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    let overrides = cli.database.overrides(cli.command.compression_override());
    let config = match ConfigLoader::new()
        .with_overrides(overrides)
        .load(&config_path)
    {
        Ok(config) => config,
        Err(e) => {
            logging::init_fallback(cli.verbose);
            return Err(e).with_context(|| {
                format!("Failed to load configuration from {}", config_path.display())
            });
        }
    };

    logging::init(&config.logging, cli.verbose)?;

    if !handle_command(&config, cli.command)? {
        process::exit(1);
    }

    Ok(())
}
