//! Backup CLI commands
//!
//! Bridges clap argument parsing with the backup and restore lifecycles.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Args, Subcommand};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::error;

use crate::backup::{BackupCatalog, BackupInfo, BackupLifecycle, RestoreLifecycle};
use crate::config::{ConfigModel, ConfigOverrides};
use crate::connection::DefaultConnectionFactory;
use crate::credentials::DefaultCredentialResolver;
use crate::error::HegemonResult;
use crate::notify::JsonlNotifier;

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up the configured database
    Backup {
        /// Backup type (full, incremental, differential)
        #[arg(short = 't', long = "type", default_value = "full")]
        backup_type: String,
        /// Compression override
        #[arg(long, value_parser = ["none", "gzip"])]
        compression: Option<String>,
    },

    /// Restore the database from a backup
    Restore {
        /// Backup filename or path (use 'latest' for most recent)
        backup: String,
    },

    /// List available backups
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check that a backup file is intact
    Verify {
        /// Backup filename or path (use 'latest' for most recent)
        backup: String,
    },

    /// Delete backups outside the retention policy
    Prune {
        /// Skip the dry run and delete
        #[arg(short, long)]
        force: bool,
    },
}

impl Commands {
    /// Compression override carried by the command, if any
    pub fn compression_override(&self) -> Option<String> {
        match self {
            Commands::Backup { compression, .. } => compression.clone(),
            _ => None,
        }
    }
}

/// Database connection flags that override the config file
#[derive(Args, Debug, Default, Clone)]
pub struct DatabaseArgs {
    /// Database type (postgres, mysql, sqlite)
    #[arg(long, global = true)]
    pub db_type: Option<String>,
    /// Database host
    #[arg(long, global = true)]
    pub db_host: Option<String>,
    /// Database port
    #[arg(long, global = true)]
    pub db_port: Option<u16>,
    /// Database name
    #[arg(long, global = true)]
    pub db_name: Option<String>,
    /// Database username
    #[arg(long, global = true)]
    pub db_user: Option<String>,
    /// Database password
    #[arg(long, global = true, env = "HEGEMON_DB_PASSWORD", hide_env_values = true)]
    pub db_pass: Option<String>,
    /// SQLite database file path
    #[arg(long, global = true)]
    pub db_file: Option<PathBuf>,
}

impl DatabaseArgs {
    pub fn overrides(&self, compression: Option<String>) -> ConfigOverrides {
        ConfigOverrides {
            db_type: self.db_type.clone(),
            db_host: self.db_host.clone(),
            db_port: self.db_port,
            db_name: self.db_name.clone(),
            db_user: self.db_user.clone(),
            db_password: self.db_pass.clone(),
            db_file: self.db_file.clone(),
            compression,
        }
    }
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Filename")]
    filename: String,
    #[tabled(rename = "Type")]
    backup_type: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Size")]
    size: String,
}

impl From<&BackupInfo> for BackupRow {
    fn from(info: &BackupInfo) -> Self {
        let age = Utc::now().signed_duration_since(info.created_at);
        Self {
            filename: info.filename.clone(),
            backup_type: info.backup_type.to_string(),
            created: info.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            age: format_duration(age),
            size: format_size(info.size_bytes),
        }
    }
}

/// Handle a command against a loaded configuration
///
/// Returns whether the command succeeded.
pub fn handle_command(config: &ConfigModel, cmd: Commands) -> HegemonResult<bool> {
    let catalog = BackupCatalog::new(config.storage.local_path.clone());

    match cmd {
        Commands::Backup { backup_type, .. } => {
            let factory = DefaultConnectionFactory::new(Box::new(
                DefaultCredentialResolver::from_config(config),
            ));
            let notifier = JsonlNotifier::new();
            match BackupLifecycle::new(config, &factory, &notifier).try_run(&backup_type) {
                Ok(path) => {
                    println!("Backup created: {}", path.display());
                    Ok(true)
                }
                Err(e) => {
                    error!(error = %e, "Backup failed");
                    Ok(false)
                }
            }
        }

        Commands::Restore { backup } => {
            let path = catalog.resolve(&backup)?;
            let factory = DefaultConnectionFactory::new(Box::new(
                DefaultCredentialResolver::from_config(config),
            ));
            let notifier = JsonlNotifier::new();
            let ok = RestoreLifecycle::new(config, &factory, &notifier).run(&path);
            if ok {
                println!("Restored from: {}", path.display());
            }
            Ok(ok)
        }

        Commands::List { json } => {
            let backups = catalog.list()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
                return Ok(true);
            }

            if backups.is_empty() {
                println!("No backups found in {}.", catalog.backup_dir().display());
                println!("Create one with: hegemon backup");
                return Ok(true);
            }

            let rows: Vec<BackupRow> = backups.iter().map(BackupRow::from).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{}", table);
            println!("Total: {} backup(s)", backups.len());
            Ok(true)
        }

        Commands::Verify { backup } => {
            let path = catalog.resolve(&backup)?;
            let report = catalog.verify(&path)?;
            println!("{}", report.summary());
            Ok(true)
        }

        Commands::Prune { force } => {
            let retention = &config.backup.retention;
            let now = Utc::now();
            let expired = catalog.expired(retention, now)?;

            if expired.is_empty() {
                println!("No backups to prune.");
                println!(
                    "Retention policy: {} days, at most {} backups",
                    retention.days, retention.max_backups
                );
                return Ok(true);
            }

            if !force {
                println!("Would delete {} backup(s):", expired.len());
                for backup in &expired {
                    println!("  {}", backup.filename);
                }
                println!("To delete them, run again with --force:");
                println!("  hegemon prune --force");
                return Ok(true);
            }

            let deleted = catalog.enforce_retention(retention, now)?;
            println!("Deleted {} backup(s).", deleted.len());
            Ok(true)
        }
    }
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a file size in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
