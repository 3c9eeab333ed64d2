//! Backup and restore lifecycles
//!
//! # Architecture
//!
//! - `BackupLifecycle`: dump, compress and atomically publish one artifact
//! - `RestoreLifecycle`: decompress if needed and load one artifact
//! - `BackupCatalog`: list, verify and prune published artifacts
//!
//! # Artifact Layout
//!
//! Artifacts live directly under `storage.localPath`:
//! - `backup_<YYYYMMDD>_<HHMMSS>_<type>.dump` (uncompressed)
//! - `backup_<YYYYMMDD>_<HHMMSS>_<type>.dump.gz` (compressed)
//!
//! While a dump is in flight it is written to `.tmp_<name>.dump` in the same
//! directory. The staging file is renamed or compressed into the final name
//! and then removed, so a final artifact is either complete or absent.
//!
//! # Example
//!
//! ```rust,ignore
//! use hegemon::backup::BackupLifecycle;
//!
//! let lifecycle = BackupLifecycle::new(&config, &factory, &notifier);
//! if lifecycle.run("full") {
//!     println!("backup published");
//! }
//! ```

mod catalog;
mod manager;
mod restore;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::connection::DatabaseConnection;
use crate::error::{ErrorKind, HegemonError, HegemonResult};

pub use catalog::{artifact_stem, parse_artifact_name, BackupCatalog, BackupInfo, VerificationReport};
pub use manager::BackupLifecycle;
pub use restore::RestoreLifecycle;

/// Recognized backup types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupType {
    Full,
    Incremental,
    Differential,
}

impl BackupType {
    pub fn parse(s: &str) -> HegemonResult<Self> {
        match s {
            "" => Err(HegemonError::Validation("Backup type cannot be empty".into())),
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            "differential" => Ok(Self::Differential),
            other => Err(HegemonError::Validation(format!(
                "Invalid backup type: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Differential => "differential",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keep `err` if it already has `kind`, otherwise rewrap it with `wrap`
pub(crate) fn ensure_kind(
    err: HegemonError,
    kind: ErrorKind,
    wrap: fn(String) -> HegemonError,
) -> HegemonError {
    if err.kind() == kind {
        err
    } else {
        wrap(err.to_string())
    }
}

/// Remove a file, treating absence as success
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// A temporary file owned by the current run, removed when dropped
pub(crate) struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Remove now and report the outcome
    pub(crate) fn remove(&self) -> io::Result<()> {
        remove_if_exists(&self.path)
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_if_exists(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove temporary file");
        }
    }
}

/// An open connection that is disconnected when the run ends
pub(crate) struct ConnectionGuard {
    conn: Box<dyn DatabaseConnection>,
    connected: bool,
}

impl ConnectionGuard {
    pub(crate) fn new(conn: Box<dyn DatabaseConnection>) -> Self {
        Self {
            conn,
            connected: false,
        }
    }

    pub(crate) fn connect(
        &mut self,
        config: &crate::config::model::DatabaseConfig,
    ) -> HegemonResult<()> {
        self.conn.connect(config).map_err(|e| {
            ensure_kind(e, ErrorKind::Connection, |m| {
                HegemonError::Connection(format!("Failed to connect to database: {}", m))
            })
        })?;
        self.connected = true;
        Ok(())
    }

    pub(crate) fn conn(&mut self) -> &mut dyn DatabaseConnection {
        self.conn.as_mut()
    }

    /// Disconnect, downgrading failure to a warning
    pub(crate) fn close(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        if let Err(e) = self.conn.disconnect() {
            warn!(error = %e, "Failed to disconnect from database");
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.close();
    }
}
