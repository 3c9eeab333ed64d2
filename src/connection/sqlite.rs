//! SQLite connection
//!
//! SQLite databases are single files, so a dump is a byte copy of the
//! database file and a restore copies it back through a sibling temp file.

use std::fs;
use std::path::{Path, PathBuf};

use super::{require_connected, ConnectionState, DatabaseConnection};
use crate::config::model::DatabaseConfig;
use crate::error::{HegemonError, HegemonResult};

#[derive(Debug, Default)]
pub struct SqliteConnection {
    db_path: Option<PathBuf>,
    state: ConnectionState,
}

impl SqliteConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn db_path(&self) -> HegemonResult<&Path> {
        require_connected(self.state)?;
        self.db_path
            .as_deref()
            .ok_or_else(|| HegemonError::Connection("Not connected to database".into()))
    }
}

impl DatabaseConnection for SqliteConnection {
    fn connect(&mut self, config: &DatabaseConfig) -> HegemonResult<()> {
        let path = PathBuf::from(&config.database);
        if !path.is_file() {
            return Err(HegemonError::Connection(format!(
                "SQLite database file not found: {}",
                path.display()
            )));
        }
        self.db_path = Some(path);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) -> HegemonResult<()> {
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn create_backup(&mut self, destination: &Path) -> HegemonResult<()> {
        let db_path = self.db_path()?;
        fs::copy(db_path, destination).map_err(|e| {
            HegemonError::Backup(format!(
                "Failed to copy {} to {}: {}",
                db_path.display(),
                destination.display(),
                e
            ))
        })?;
        Ok(())
    }

    fn restore_backup(&mut self, source: &Path) -> HegemonResult<()> {
        let db_path = self.db_path()?.to_path_buf();
        let temp_path = db_path.with_extension("restore.tmp");

        fs::copy(source, &temp_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            HegemonError::Restore(format!("Failed to stage {}: {}", source.display(), e))
        })?;

        fs::rename(&temp_path, &db_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            HegemonError::Restore(format!(
                "Failed to replace {}: {}",
                db_path.display(),
                e
            ))
        })?;
        Ok(())
    }
}
