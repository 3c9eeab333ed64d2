//! PostgreSQL connection via the `pg_*` client tools
//!
//! Dumps use the custom archive format so `pg_restore` can replay them.
//! The password is handed over through `PGPASSWORD`.

use std::path::Path;
use std::process::Command;

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
pub struct PostgresConnection {
    password: Option<Secret>,
    target: Target,
    state: ConnectionState,
}

impl PostgresConnection {
    pub fn new(password: Option<Secret>) -> Self {
        Self {
            password,
            target: Target::default(),
            state: ConnectionState::Disconnected,
        }
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("--host")
            .arg(&self.target.host)
            .arg("--port")
            .arg(self.target.port.to_string());
        if let Some(user) = &self.target.username {
            cmd.arg("--username").arg(user);
        }
        if let Some(password) = &self.password {
            cmd.env("PGPASSWORD", password.expose());
        }
        cmd
    }

    fn target_from(config: &DatabaseConfig) -> Target {
        Target {
            host: config.host.clone().unwrap_or_default(),
            port: config.port.unwrap_or(5432),
            database: config.database.clone(),
            username: config.login().map(str::to_string),
        }
    }

    fn ping_command(&self) -> Command {
        let mut cmd = self.command("pg_isready");
        cmd.arg("--dbname").arg(&self.target.database);
        cmd
    }

    fn dump_command(&self, destination: &Path) -> Command {
        let mut cmd = self.command("pg_dump");
        cmd.arg("--format=custom")
            .arg("--file")
            .arg(destination)
            .arg(&self.target.database);
        cmd
    }

    fn restore_command(&self, source: &Path) -> Command {
        let mut cmd = self.command("pg_restore");
        cmd.arg("--clean")
            .arg("--if-exists")
            .arg("--dbname")
            .arg(&self.target.database)
            .arg(source);
        cmd
    }
}

impl DatabaseConnection for PostgresConnection {
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
        run_tool(self.restore_command(source), HegemonError::Restore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::tests::sqlite_model;
    use crate::config::model::DatabaseType;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    fn connection(password: Option<&str>) -> PostgresConnection {
        let mut config = sqlite_model("app", PathBuf::from("/tmp/bk"));
        config.database.db_type = DatabaseType::Postgres;
        config.database.host = Some("db.internal".into());
        config.database.port = Some(6543);
        config.database.username = Some("backup_svc".into());

        let mut conn = PostgresConnection::new(password.map(Secret::from));
        conn.target = PostgresConnection::target_from(&config.database);
        conn
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn env<'a>(cmd: &'a Command, name: &str) -> Option<Option<&'a OsStr>> {
        cmd.get_envs()
            .find(|(key, _)| *key == OsStr::new(name))
            .map(|(_, value)| value)
    }

    #[test]
    fn test_dump_command() {
        let conn = connection(Some("pw"));
        let cmd = conn.dump_command(Path::new("/bk/.tmp_x.dump"));

        assert_eq!(cmd.get_program(), "pg_dump");
        assert_eq!(
            args(&cmd),
            vec![
                "--host",
                "db.internal",
                "--port",
                "6543",
                "--username",
                "backup_svc",
                "--format=custom",
                "--file",
                "/bk/.tmp_x.dump",
                "app",
            ]
        );
        assert_eq!(env(&cmd, "PGPASSWORD"), Some(Some(OsStr::new("pw"))));
    }

    #[test]
    fn test_restore_command() {
        let conn = connection(None);
        let cmd = conn.restore_command(Path::new("/bk/x.dump"));

        assert_eq!(cmd.get_program(), "pg_restore");
        let args = args(&cmd);
        assert!(args.ends_with(&[
            "--clean".to_string(),
            "--if-exists".to_string(),
            "--dbname".to_string(),
            "app".to_string(),
            "/bk/x.dump".to_string(),
        ]));
        assert_eq!(env(&cmd, "PGPASSWORD"), None);
    }

    #[test]
    fn test_ping_command() {
        let cmd = connection(None).ping_command();
        assert_eq!(cmd.get_program(), "pg_isready");
        assert!(args(&cmd).ends_with(&["--dbname".to_string(), "app".to_string()]));
    }

    #[test]
    fn test_backup_requires_connection() {
        let mut conn = connection(None);
        let err = conn.create_backup(Path::new("/bk/x.dump")).unwrap_err();
        assert!(matches!(err, HegemonError::Connection(_)));
    }
}
