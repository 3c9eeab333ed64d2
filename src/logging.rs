//! Tracing subscriber setup
//!
//! Events go to stderr and are appended to the configured log file. The
//! level comes from `logging.logLevel`; `RUST_LOG` takes precedence and
//! `--verbose` forces `debug`.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::model::LoggingConfig;
use crate::error::{HegemonError, HegemonResult};

/// Build the filter directive for a logging section
pub fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.log_level.as_str().to_string()
    }
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig, verbose: bool) -> HegemonResult<()> {
    if let Some(parent) = config.log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                HegemonError::config(format!(
                    "Failed to create log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
        .map_err(|e| {
            HegemonError::config(format!(
                "Failed to open log file {}: {}",
                config.log_path.display(),
                e
            ))
        })?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .try_init()
        .map_err(|e| HegemonError::config(format!("Failed to initialize logging: {}", e)))
}

/// Minimal stderr-only subscriber used before a configuration is available
pub fn init_fallback(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
