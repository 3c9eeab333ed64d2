//! MySQL connection via `mysqldump` and the `mysql` client
//!
//! The password is handed over through `MYSQL_PWD`.

use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use super::{require_connected, run_tool, ConnectionState, DatabaseConnection};
use crate::config::model::DatabaseConfig;
use crate::credentials::Secret;
use crate::error::{HegemonError, HegemonResult};

#[derive(Debug, Default)]
struct Target {
    host: String,
    port: u16,
    database: String,
    username: Option<String>,
}

#[derive(Debug)]
pub struct MysqlConnection {
    password: Option<Secret>,
    target: Target,
    state: ConnectionState,
}

impl MysqlConnection {
    pub fn new(password: Option<Secret>) -> Self {
        Self {
            password,
            target: Target::default(),
            state: ConnectionState::Disconnected,
        }
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg(format!("--host={}", self.target.host))
            .arg(format!("--port={}", self.target.port));
        if let Some(user) = &self.target.username {
            cmd.arg(format!("--user={}", user));
        }
        if let Some(password) = &self.password {
            cmd.env("MYSQL_PWD", password.expose());
        }
        cmd
    }

    fn target_from(config: &DatabaseConfig) -> Target {
        Target {
            host: config.host.clone().unwrap_or_default(),
            port: config.port.unwrap_or(3306),
            database: config.database.clone(),
            username: config.login().map(str::to_string),
        }
    }

    fn ping_command(&self) -> Command {
        let mut cmd = self.command("mysqladmin");
        cmd.arg("ping");
        cmd
    }

    fn dump_command(&self, destination: &Path) -> Command {
        let mut cmd = self.command("mysqldump");
        cmd.arg("--single-transaction")
            .arg(format!("--result-file={}", destination.display()))
            .arg(&self.target.database);
        cmd
    }

    /// The dump itself is fed on stdin by the caller
    fn restore_command(&self) -> Command {
        let mut cmd = self.command("mysql");
        cmd.arg(&self.target.database);
        cmd
    }
}

impl DatabaseConnection for MysqlConnection {
    fn connect(&mut self, config: &DatabaseConfig) -> HegemonResult<()> {
        self.target = Self::target_from(config);
        run_tool(self.ping_command(), HegemonError::Connection)?;

        self.state = ConnectionState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) -> HegemonResult<()> {
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn create_backup(&mut self, destination: &Path) -> HegemonResult<()> {
        require_connected(self.state)?;
        run_tool(self.dump_command(destination), HegemonError::Backup)
    }

    fn restore_backup(&mut self, source: &Path) -> HegemonResult<()> {
        require_connected(self.state)?;
        let dump = File::open(source).map_err(|e| {
            HegemonError::Restore(format!("Failed to open {}: {}", source.display(), e))
        })?;
        let mut cmd = self.restore_command();
        cmd.stdin(Stdio::from(dump));
        run_tool(cmd, HegemonError::Restore)
    }
}
