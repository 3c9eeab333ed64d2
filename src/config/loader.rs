//! Configuration loading and validation
//!
//! The JSON document is first deserialized into loosely typed `Raw*` structs
//! where every field is optional. [`ConfigLoader`] then walks the sections
//! in a fixed order, substituting environment variables and failing on the
//! first missing or invalid field. Command-line overrides are merged into
//! the raw document before that walk, so the resulting [`ConfigModel`] is
//! built exactly once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::env::substitute_env_vars;
use super::model::{
    BackupConfig, CompressionConfig, ConfigModel, CredentialStoreConfig, CredentialsConfig,
    DatabaseConfig, DatabaseType, EncryptionConfig, LogLevel, LoggingConfig, RetentionPolicy,
    ScheduleConfig, SecurityConfig, StorageConfig, DEFAULT_CRON, DEFAULT_NAMESPACE,
};
use crate::credentials::{CredentialSource, Secret};
use crate::error::{HegemonError, HegemonResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    database: Option<RawDatabase>,
    storage: Option<RawStorage>,
    logging: Option<RawLogging>,
    backup: Option<RawBackup>,
    security: Option<RawSecurity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDatabase {
    #[serde(rename = "type")]
    db_type: Option<String>,
    host: Option<String>,
    port: Option<i64>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    credentials: Option<RawCredentials>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCredentials {
    username: Option<String>,
    password_key: Option<String>,
    preferred_sources: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStorage {
    local_path: Option<String>,
    cloud_provider: Option<String>,
    cloud_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLogging {
    log_path: Option<String>,
    log_level: Option<String>,
    enable_notifications: Option<bool>,
    notification_endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBackup {
    compression: Option<RawCompression>,
    retention: Option<RawRetention>,
    schedule: Option<RawSchedule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompression {
    enabled: Option<bool>,
    format: Option<String>,
    level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRetention {
    days: Option<u32>,
    max_backups: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedule {
    enabled: Option<bool>,
    #[serde(alias = "cronExpression")]
    cron: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSecurity {
    encryption: Option<RawEncryption>,
    credential_store: Option<RawCredentialStore>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEncryption {
    enabled: Option<bool>,
    algorithm: Option<String>,
    key_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCredentialStore {
    enabled: Option<bool>,
    #[serde(rename = "type")]
    store_type: Option<String>,
    path: Option<String>,
    key_prefix: Option<String>,
    options: Option<BTreeMap<String, String>>,
}

/// Values supplied on the command line that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_type: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    /// Database file for file-based engines
    pub db_file: Option<PathBuf>,
    /// `none` disables compression, anything else enables it with that format
    pub compression: Option<String>,
}

impl ConfigOverrides {
    fn apply(&self, raw: &mut RawConfig) {
        let touches_database = self.db_type.is_some()
            || self.db_host.is_some()
            || self.db_port.is_some()
            || self.db_name.is_some()
            || self.db_user.is_some()
            || self.db_password.is_some()
            || self.db_file.is_some();

        if touches_database {
            let db = raw.database.get_or_insert_with(RawDatabase::default);
            if let Some(t) = &self.db_type {
                db.db_type = Some(t.clone());
            }
            if let Some(h) = &self.db_host {
                db.host = Some(h.clone());
            }
            if let Some(p) = self.db_port {
                db.port = Some(i64::from(p));
            }
            if let Some(n) = &self.db_name {
                db.database = Some(n.clone());
            }
            if let Some(f) = &self.db_file {
                db.database = Some(f.to_string_lossy().into_owned());
            }
            if let Some(u) = &self.db_user {
                match db.credentials.as_mut() {
                    Some(creds) => creds.username = Some(u.clone()),
                    None => db.username = Some(u.clone()),
                }
            }
            if let Some(p) = &self.db_password {
                db.password = Some(p.clone());
            }
        }

        if let Some(mode) = &self.compression {
            let backup = raw.backup.get_or_insert_with(RawBackup::default);
            let compression = backup
                .compression
                .get_or_insert_with(RawCompression::default);
            if mode == "none" {
                compression.enabled = Some(false);
            } else {
                compression.enabled = Some(true);
                compression.format = Some(mode.clone());
            }
        }
    }
}

/// Builds a [`ConfigModel`] from a JSON configuration file
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    overrides: ConfigOverrides,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply command-line overrides on top of the file contents
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Load and validate the configuration at `path`
    pub fn load(&self, path: &Path) -> HegemonResult<ConfigModel> {
        if !path.exists() {
            return Err(HegemonError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            HegemonError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "Loading configuration");
        self.load_str(&contents)
    }

    /// Load and validate configuration from an in-memory JSON document
    pub fn load_str(&self, contents: &str) -> HegemonResult<ConfigModel> {
        let mut raw: RawConfig = serde_json::from_str(contents).map_err(|e| {
            HegemonError::config(format!("Failed to parse config file: {}", e))
        })?;
        self.overrides.apply(&mut raw);

        let database = build_database(raw.database)?;
        let storage = build_storage(raw.storage)?;
        let logging = build_logging(raw.logging)?;
        let backup = build_backup(raw.backup);
        let security = build_security(raw.security)?;

        let config = ConfigModel {
            database,
            storage,
            logging,
            backup,
            security,
        };
        config.validate()?;
        Ok(config)
    }
}

fn build_database(raw: Option<RawDatabase>) -> HegemonResult<DatabaseConfig> {
    let raw = raw.ok_or_else(|| HegemonError::config("Missing 'database' section in config"))?;
    let type_token = raw
        .db_type
        .ok_or_else(|| HegemonError::missing_field("database.type"))?;
    let db_type = DatabaseType::parse(&type_token)?;

    let mut host = None;
    let mut port = None;
    let mut username = None;
    let mut password = None;

    let database = if db_type.is_file_based() {
        let path = raw
            .database
            .ok_or_else(|| HegemonError::missing_field("database.database"))?;
        substitute_env_vars(&path, true)?
    } else {
        let h = raw
            .host
            .ok_or_else(|| HegemonError::missing_field("database.host"))?;
        let p = raw
            .port
            .ok_or_else(|| HegemonError::missing_field("database.port"))?;
        host = Some(h);
        port = Some(
            u16::try_from(p)
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| HegemonError::config(format!("Invalid database port: {}", p)))?,
        );

        if let Some(u) = &raw.username {
            username = Some(substitute_env_vars(u, true)?);
        }
        if let Some(pw) = &raw.password {
            password = Some(Secret::new(substitute_env_vars(pw, true)?));
        }
        raw.database.unwrap_or_default()
    };

    let credentials = match raw.credentials {
        Some(creds) => {
            let login = match &creds.username {
                Some(u) => substitute_env_vars(u, true)?,
                None => String::new(),
            };
            let password_key = creds
                .password_key
                .unwrap_or_else(|| CredentialsConfig::default_password_key(db_type, &login));
            let preferred_sources = creds
                .preferred_sources
                .unwrap_or_default()
                .iter()
                .map(|token| CredentialSource::parse(token))
                .collect::<HegemonResult<Vec<_>>>()?;
            CredentialsConfig {
                username: login,
                password_key,
                preferred_sources,
            }
        }
        None => {
            let login = match (&username, &raw.username) {
                (Some(u), _) => u.clone(),
                (None, Some(u)) => substitute_env_vars(u, true)?,
                (None, None) => String::new(),
            };
            CredentialsConfig {
                password_key: CredentialsConfig::default_password_key(db_type, &login),
                username: login,
                preferred_sources: Vec::new(),
            }
        }
    };

    Ok(DatabaseConfig {
        db_type,
        host,
        port,
        database,
        username,
        password,
        credentials,
    })
}

fn build_storage(raw: Option<RawStorage>) -> HegemonResult<StorageConfig> {
    let raw = raw.ok_or_else(|| HegemonError::config("Missing 'storage' section in config"))?;
    let local_path = raw
        .local_path
        .ok_or_else(|| HegemonError::missing_field("storage.localPath"))?;

    Ok(StorageConfig {
        local_path: PathBuf::from(local_path),
        cloud_provider: raw.cloud_provider,
        cloud_path: raw.cloud_path,
    })
}

fn build_logging(raw: Option<RawLogging>) -> HegemonResult<LoggingConfig> {
    let raw = raw.ok_or_else(|| HegemonError::config("Missing 'logging' section in config"))?;
    let log_path = raw
        .log_path
        .ok_or_else(|| HegemonError::missing_field("logging.logPath"))?;
    let log_level = raw
        .log_level
        .ok_or_else(|| HegemonError::missing_field("logging.logLevel"))?;
    let log_level = LogLevel::parse(&log_level)?;

    let enable_notifications = raw.enable_notifications.unwrap_or(false);
    let notification_endpoint = match &raw.notification_endpoint {
        Some(endpoint) => Some(substitute_env_vars(endpoint, enable_notifications)?),
        None => None,
    };

    Ok(LoggingConfig {
        log_path: PathBuf::from(log_path),
        log_level,
        enable_notifications,
        notification_endpoint,
    })
}

fn build_backup(raw: Option<RawBackup>) -> BackupConfig {
    let Some(raw) = raw else {
        return BackupConfig::default();
    };

    let defaults = CompressionConfig::default();
    let compression = match raw.compression {
        Some(c) => CompressionConfig {
            enabled: c.enabled.unwrap_or(defaults.enabled),
            format: c.format.unwrap_or(defaults.format),
            level: c.level.unwrap_or(defaults.level),
        },
        None => defaults,
    };

    let defaults = RetentionPolicy::default();
    let retention = match raw.retention {
        Some(r) => RetentionPolicy {
            days: r.days.unwrap_or(defaults.days),
            max_backups: r.max_backups.unwrap_or(defaults.max_backups),
        },
        None => defaults,
    };

    let schedule = match raw.schedule {
        Some(s) => ScheduleConfig {
            enabled: s.enabled.unwrap_or(false),
            cron_expression: s.cron.unwrap_or_else(|| DEFAULT_CRON.to_string()),
        },
        None => ScheduleConfig::default(),
    };

    BackupConfig {
        compression,
        retention,
        schedule,
    }
}

fn build_security(raw: Option<RawSecurity>) -> HegemonResult<SecurityConfig> {
    let Some(raw) = raw else {
        return Ok(SecurityConfig::default());
    };

    let mut encryption = EncryptionConfig::default();
    if let Some(enc) = raw.encryption {
        encryption.enabled = enc.enabled.unwrap_or(false);
        if encryption.enabled {
            encryption.algorithm = enc.algorithm.unwrap_or_else(|| "AES-256-GCM".to_string());
            let key_path = enc
                .key_path
                .ok_or_else(|| HegemonError::missing_field("security.encryption.keyPath"))?;
            encryption.key_path = Some(PathBuf::from(substitute_env_vars(&key_path, true)?));
        }
    }

    let mut credential_store = CredentialStoreConfig::default();
    if let Some(store) = raw.credential_store {
        credential_store.enabled = store.enabled.unwrap_or(false);
        if credential_store.enabled {
            credential_store.store_type = store
                .store_type
                .ok_or_else(|| HegemonError::config("Credential store type not specified"))?;
            if let Some(path) = &store.path {
                credential_store.path = Some(PathBuf::from(substitute_env_vars(path, false)?));
            }
            credential_store.key_prefix = store
                .key_prefix
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
            for (key, value) in store.options.unwrap_or_default() {
                let value = substitute_env_vars(&value, false)?;
                credential_store.options.insert(key, value);
            }
        }
    }

    Ok(SecurityConfig {
        encryption,
        credential_store,
    })
}
