//! Typed configuration model
//!
//! A [`ConfigModel`] is produced once by the loader and is never mutated
//! afterwards. Components receive the sections they need by reference.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::credentials::{CredentialSource, Secret};
use crate::error::{HegemonError, HegemonResult};

/// Namespace used when synthesizing password keys and as the default
/// credential store key prefix
pub const DEFAULT_NAMESPACE: &str = "hegemon";

/// Default cron expression (daily at midnight)
pub const DEFAULT_CRON: &str = "0 0 * * *";

static CRON_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\*|[0-9,\-*/]+)\s+(\*|[0-9,\-*/]+)\s+(\*|[0-9,\-*/]+)\s+(\*|[0-9,\-*/]+)\s+(\*|[0-9,\-*/]+)$",
    )
    .expect("cron pattern is valid")
});

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    Postgres,
    Mysql,
    /// Embedded, file-based engine
    Sqlite,
}

impl DatabaseType {
    /// Parse the `database.type` token
    pub fn parse(s: &str) -> HegemonResult<Self> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(HegemonError::config(format!(
                "Unsupported database type: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Whether the engine is addressed by a file path instead of host/port
    pub fn is_file_based(&self) -> bool {
        matches!(self, Self::Sqlite)
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the database password is located
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsConfig {
    pub username: String,
    /// Key under which the password is stored in a credential source
    pub password_key: String,
    /// Sources in priority order; first successful resolution wins
    pub preferred_sources: Vec<CredentialSource>,
}

impl CredentialsConfig {
    /// Synthesize `<namespace>.<dbtype>.<username>.password`
    pub fn default_password_key(db_type: DatabaseType, username: &str) -> String {
        format!("{}.{}.{}.password", DEFAULT_NAMESPACE, db_type, username)
    }
}

/// Database target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub db_type: DatabaseType,
    /// Unused for file-based engines
    pub host: Option<String>,
    /// Unused for file-based engines
    pub port: Option<u16>,
    /// Database name, or the database file path for file-based engines
    pub database: String,
    pub username: Option<String>,
    /// Inline password, resolvable through [`CredentialSource::ConfigFile`]
    pub password: Option<Secret>,
    pub credentials: CredentialsConfig,
}

impl DatabaseConfig {
    /// Effective login name: the credentials block wins over the root field
    pub fn login(&self) -> Option<&str> {
        if !self.credentials.username.is_empty() {
            Some(self.credentials.username.as_str())
        } else {
            self.username.as_deref().filter(|u| !u.is_empty())
        }
    }
}

/// Where backup artifacts are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub local_path: PathBuf,
    pub cloud_provider: Option<String>,
    pub cloud_path: Option<String>,
}

/// Accepted log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> HegemonResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(HegemonError::config(format!("Invalid log level: {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging and notification settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub log_path: PathBuf,
    pub log_level: LogLevel,
    pub enable_notifications: bool,
    pub notification_endpoint: Option<String>,
}

/// Compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Bzip2,
    Xz,
}

impl CompressionFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gzip" => Some(Self::Gzip),
            "bzip2" => Some(Self::Bzip2),
            "xz" => Some(Self::Xz),
            _ => None,
        }
    }
}

/// Compression effort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    Low,
    Medium,
    High,
}

impl CompressionLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Compression settings. `format` and `level` are kept as written and only
/// validated when compression is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub format: String,
    pub level: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            format: "gzip".to_string(),
            level: "medium".to_string(),
        }
    }
}

impl CompressionConfig {
    pub fn format_kind(&self) -> Option<CompressionFormat> {
        CompressionFormat::parse(&self.format)
    }

    pub fn level_kind(&self) -> Option<CompressionLevel> {
        CompressionLevel::parse(&self.level)
    }
}

/// Backup retention policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Artifacts older than this many days are pruned
    pub days: u32,
    /// Maximum number of artifacts kept
    pub max_backups: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            days: 30,
            max_backups: 10,
        }
    }
}

/// Schedule settings (data only; nothing in this crate executes it)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub cron_expression: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron_expression: DEFAULT_CRON.to_string(),
        }
    }
}

/// Backup policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupConfig {
    pub compression: CompressionConfig,
    pub retention: RetentionPolicy,
    pub schedule: ScheduleConfig,
}

/// At-rest encryption settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionConfig {
    pub enabled: bool,
    pub algorithm: String,
    pub key_path: Option<PathBuf>,
}

/// Credential store settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialStoreConfig {
    pub enabled: bool,
    pub store_type: String,
    pub path: Option<PathBuf>,
    pub key_prefix: String,
    pub options: BTreeMap<String, String>,
}

/// Security policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityConfig {
    pub encryption: EncryptionConfig,
    pub credential_store: CredentialStoreConfig,
}

/// Complete, validated configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigModel {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub backup: BackupConfig,
    pub security: SecurityConfig,
}

impl ConfigModel {
    /// Re-check every cross-field invariant
    ///
    /// The loader calls this as its last step, so a model that escapes the
    /// loader always satisfies these rules.
    pub fn validate(&self) -> HegemonResult<()> {
        validate_database(&self.database)?;

        if self.storage.local_path.as_os_str().is_empty() {
            return Err(HegemonError::config("Storage local path cannot be empty"));
        }
        if self.logging.log_path.as_os_str().is_empty() {
            return Err(HegemonError::config("Log path cannot be empty"));
        }

        let compression = &self.backup.compression;
        if compression.enabled {
            if compression.format_kind().is_none() {
                return Err(HegemonError::config(format!(
                    "Invalid compression format: {}",
                    compression.format
                )));
            }
            if compression.level_kind().is_none() {
                return Err(HegemonError::config(format!(
                    "Invalid compression level: {}",
                    compression.level
                )));
            }
        }

        let schedule = &self.backup.schedule;
        if schedule.enabled && !is_valid_cron(&schedule.cron_expression) {
            return Err(HegemonError::config(format!(
                "Invalid cron expression: {}",
                schedule.cron_expression
            )));
        }

        if self.security.credential_store.enabled
            && self.security.credential_store.store_type.is_empty()
        {
            return Err(HegemonError::config("Credential store type not specified"));
        }

        Ok(())
    }
}

/// Engine-specific requirements of the database section
///
/// File-based engines need a database path; networked engines need a host,
/// a non-zero port and a database name.
pub fn validate_database(db: &DatabaseConfig) -> HegemonResult<()> {
    if db.db_type.is_file_based() {
        if db.database.is_empty() {
            return Err(HegemonError::config(
                "SQLite database file path cannot be empty",
            ));
        }
        return Ok(());
    }

    if db.host.as_deref().map_or(true, str::is_empty) {
        return Err(HegemonError::config("Database host cannot be empty"));
    }
    if db.port.map_or(true, |p| p == 0) {
        return Err(HegemonError::config("Invalid database port"));
    }
    if db.database.is_empty() {
        return Err(HegemonError::config("Database name cannot be empty"));
    }
    Ok(())
}

/// Check a 5-field cron expression
pub fn is_valid_cron(expr: &str) -> bool {
    CRON_PATTERN.is_match(expr)
}
