//! Database connections
//!
//! The lifecycle drives engines through [`DatabaseConnection`]. A
//! connection is opened per run and dropped when the run ends; nothing is
//! pooled or reused.

mod mysql;
mod postgres;
mod sqlite;

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::config::model::{validate_database, DatabaseConfig, DatabaseType};
use crate::credentials::{CredentialResolver, Secret};
use crate::error::{HegemonError, HegemonResult};

pub use mysql::MysqlConnection;
pub use postgres::PostgresConnection;
pub use sqlite::SqliteConnection;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Engine-specific dump and restore capability
pub trait DatabaseConnection {
    fn connect(&mut self, config: &DatabaseConfig) -> HegemonResult<()>;

    fn disconnect(&mut self) -> HegemonResult<()>;

    /// Dump the database into a new file at `destination`
    fn create_backup(&mut self, destination: &Path) -> HegemonResult<()>;

    /// Load the dump at `source` into the database
    fn restore_backup(&mut self, source: &Path) -> HegemonResult<()>;
}

/// Produces connections for a database section
pub trait ConnectionFactory {
    /// Construct an unconnected handle for the configured engine
    fn create(&self, config: &DatabaseConfig) -> HegemonResult<Box<dyn DatabaseConnection>>;

    /// Validate the section for its engine, then construct a handle
    ///
    /// The loader already enforces these rules; they are re-checked here
    /// because a `DatabaseConfig` can be built without going through it.
    fn open(&self, config: &DatabaseConfig) -> HegemonResult<Box<dyn DatabaseConnection>> {
        validate_database(config)?;
        self.create(config)
    }
}

/// Factory for the built-in engines
pub struct DefaultConnectionFactory {
    resolver: Box<dyn CredentialResolver>,
}

impl DefaultConnectionFactory {
    pub fn new(resolver: Box<dyn CredentialResolver>) -> Self {
        Self { resolver }
    }

    fn password_for(&self, config: &DatabaseConfig) -> HegemonResult<Option<Secret>> {
        let username = config.login().unwrap_or_default();
        self.resolver.resolve(
            config.db_type,
            username,
            &config.credentials.preferred_sources,
        )
    }
}

impl ConnectionFactory for DefaultConnectionFactory {
    fn create(&self, config: &DatabaseConfig) -> HegemonResult<Box<dyn DatabaseConnection>> {
        debug!(db_type = %config.db_type, "Creating database connection");
        match config.db_type {
            DatabaseType::Sqlite => Ok(Box::new(SqliteConnection::new())),
            DatabaseType::Postgres => Ok(Box::new(PostgresConnection::new(
                self.password_for(config)?,
            ))),
            DatabaseType::Mysql => Ok(Box::new(MysqlConnection::new(self.password_for(config)?))),
        }
    }
}

/// Run an external client tool, mapping a spawn failure or non-zero exit
/// through `make_err`
pub(crate) fn run_tool(
    mut command: Command,
    make_err: fn(String) -> HegemonError,
) -> HegemonResult<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    let output = command
        .output()
        .map_err(|e| make_err(format!("Failed to run {}: {}", program, e)))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(make_err(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )))
    }
}

pub(crate) fn require_connected(state: ConnectionState) -> HegemonResult<()> {
    match state {
        ConnectionState::Connected => Ok(()),
        ConnectionState::Disconnected => {
            Err(HegemonError::Connection("Not connected to database".into()))
        }
    }
}
