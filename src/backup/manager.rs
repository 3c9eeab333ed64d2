//! Backup lifecycle
//!
//! One call to [`BackupLifecycle::run`] produces at most one published
//! artifact. Every step returns a typed error; the temp-file and connection
//! guards clean up on whichever path the run exits by.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, Span};

use super::catalog::artifact_stem;
use super::{ensure_kind, remove_if_exists, BackupType, ConnectionGuard, TempFileGuard};
use crate::compression::{compressor_for, Compressor};
use crate::config::model::{BackupConfig, ConfigModel, DatabaseConfig, LoggingConfig, StorageConfig};
use crate::connection::ConnectionFactory;
use crate::error::{ErrorKind, HegemonError, HegemonResult};
use crate::notify::NotificationSender;

/// Extension of an uncompressed dump
pub const DUMP_EXTENSION: &str = ".dump";

/// Prefix marking an in-flight staging file
pub const STAGING_PREFIX: &str = ".tmp_";

/// Orchestrates one backup run
pub struct BackupLifecycle<'a> {
    database: &'a DatabaseConfig,
    storage: &'a StorageConfig,
    backup: &'a BackupConfig,
    logging: &'a LoggingConfig,
    factory: &'a dyn ConnectionFactory,
    notifier: &'a dyn NotificationSender,
    compressor: Option<&'a dyn Compressor>,
    span: Span,
}

impl<'a> BackupLifecycle<'a> {
    pub fn new(
        config: &'a ConfigModel,
        factory: &'a dyn ConnectionFactory,
        notifier: &'a dyn NotificationSender,
    ) -> Self {
        Self {
            database: &config.database,
            storage: &config.storage,
            backup: &config.backup,
            logging: &config.logging,
            factory,
            notifier,
            compressor: None,
            span: info_span!("backup", component = "BackupManager"),
        }
    }

    /// Log every event of the run inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Use `compressor` instead of the one built from the compression section
    ///
    /// Only consulted when compression is enabled.
    pub fn with_compressor(mut self, compressor: &'a dyn Compressor) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Run a backup, logging any failure
    ///
    /// Returns true when an artifact was published.
    pub fn run(&self, backup_type: &str) -> bool {
        match self.try_run(backup_type) {
            Ok(_) => true,
            Err(e) => {
                let _guard = self.span.enter();
                error!(error = %e, "Backup failed");
                false
            }
        }
    }

    /// Run a backup and return the published artifact path
    pub fn try_run(&self, backup_type: &str) -> HegemonResult<PathBuf> {
        self.try_run_at(backup_type, Utc::now())
    }

    pub(crate) fn try_run_at(
        &self,
        backup_type: &str,
        now: DateTime<Utc>,
    ) -> HegemonResult<PathBuf> {
        let _guard = self.span.enter();

        let backup_type = BackupType::parse(backup_type)?;

        let owned_compressor;
        let compressor: Option<&dyn Compressor> = if !self.backup.compression.enabled {
            None
        } else if let Some(c) = self.compressor {
            Some(c)
        } else {
            owned_compressor = compressor_for(&self.backup.compression)?;
            owned_compressor.as_deref()
        };

        info!(backup_type = %backup_type, "Starting backup");

        let mut connection = ConnectionGuard::new(self.factory.open(self.database)?);
        connection.connect(self.database)?;

        let backup_dir = &self.storage.local_path;
        if !backup_dir.exists() {
            fs::create_dir_all(backup_dir).map_err(|e| {
                HegemonError::Storage(format!(
                    "Failed to create backup directory {}: {}",
                    backup_dir.display(),
                    e
                ))
            })?;
        }

        let stem = artifact_stem(now, backup_type);
        let staging = TempFileGuard::new(
            backup_dir.join(format!("{}{}{}", STAGING_PREFIX, stem, DUMP_EXTENSION)),
        );
        let extension = compressor.map_or("", |c| c.file_extension());
        let final_path = backup_dir.join(format!("{}{}{}", stem, DUMP_EXTENSION, extension));

        // Crash residue from an earlier run is discarded, never reused
        staging.remove().map_err(|e| {
            HegemonError::Storage(format!(
                "Failed to remove stale staging file {}: {}",
                staging.path().display(),
                e
            ))
        })?;

        connection
            .conn()
            .create_backup(staging.path())
            .map_err(|e| {
                ensure_kind(e, ErrorKind::Backup, |m| {
                    HegemonError::Backup(format!("Failed to create backup: {}", m))
                })
            })?;

        match compressor {
            Some(codec) => {
                if let Err(e) = codec.compress_file(staging.path(), &final_path) {
                    let _ = staging.remove();
                    let _ = remove_if_exists(&final_path);
                    return Err(ensure_kind(e, ErrorKind::Compression, |m| {
                        HegemonError::Compression(format!("Failed to compress backup: {}", m))
                    }));
                }
            }
            None => {
                fs::rename(staging.path(), &final_path).map_err(|e| {
                    HegemonError::Storage(format!(
                        "Failed to publish backup {}: {}",
                        final_path.display(),
                        e
                    ))
                })?;
            }
        }

        staging.remove().map_err(|e| {
            HegemonError::Storage(format!(
                "Failed to remove staging file {}: {}",
                staging.path().display(),
                e
            ))
        })?;

        if !final_path.is_file() {
            return Err(HegemonError::Storage(format!(
                "Backup file not found after creation: {}",
                final_path.display()
            )));
        }

        connection.close();

        info!(path = %final_path.display(), "Backup completed successfully");
        if self.logging.enable_notifications {
            self.notifier.send_if_needed(
                self.logging,
                &format!("Backup succeeded: {}", final_path.display()),
            );
        }

        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::tests::{dir_entries, BrokenCompressor, Script, ScriptedFactory};
    use crate::config::model::tests::sqlite_model;
    use crate::notify::tests::RecordingNotifier;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn setup(compress: bool) -> (TempDir, ConfigModel) {
        let temp = TempDir::new().unwrap();
        let mut config = sqlite_model("/data/app.db", temp.path().join("bk"));
        config.backup.compression.enabled = compress;
        (temp, config)
    }

    #[test]
    fn test_uncompressed_backup() {
        let (_temp, config) = setup(false);
        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();

        let path = BackupLifecycle::new(&config, &factory, &notifier)
            .try_run_at("full", fixed_time())
            .unwrap();

        assert_eq!(
            dir_entries(&config.storage.local_path),
            vec!["backup_20240309_140507_full.dump".to_string()]
        );
        assert_eq!(path, config.storage.local_path.join("backup_20240309_140507_full.dump"));
        assert_eq!(
            factory.calls().first().map(String::as_str),
            Some("open")
        );
        assert_eq!(factory.calls().last().map(String::as_str), Some("disconnect"));
    }

    #[test]
    fn test_compressed_backup() {
        let (_temp, config) = setup(true);
        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();

        let path = BackupLifecycle::new(&config, &factory, &notifier)
            .try_run_at("incremental", fixed_time())
            .unwrap();

        assert_eq!(
            dir_entries(&config.storage.local_path),
            vec!["backup_20240309_140507_incremental.dump.gz".to_string()]
        );
        assert!(crate::compression::verify_gzip(&path).unwrap() > 0);
    }

    #[test]
    fn test_invalid_type_has_no_side_effects() {
        let (_temp, config) = setup(false);
        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();

        let err = BackupLifecycle::new(&config, &factory, &notifier)
            .try_run("bogus")
            .unwrap_err();

        assert!(err.is_validation());
        assert!(factory.calls().is_empty());
        assert!(!config.storage.local_path.exists());
    }

    #[test]
    fn test_run_reports_false_on_failure() {
        let (_temp, config) = setup(false);
        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();

        assert!(!BackupLifecycle::new(&config, &factory, &notifier).run(""));
        assert!(BackupLifecycle::new(&config, &factory, &notifier).run("differential"));
    }

    #[test]
    fn test_compression_failure_cleans_up() {
        let (_temp, config) = setup(true);
        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();
        let broken = BrokenCompressor;

        let err = BackupLifecycle::new(&config, &factory, &notifier)
            .with_compressor(&broken)
            .try_run_at("full", fixed_time())
            .unwrap_err();

        assert!(matches!(err, HegemonError::Compression(_)));
        assert!(dir_entries(&config.storage.local_path).is_empty());
        assert_eq!(factory.calls().last().map(String::as_str), Some("disconnect"));
    }

    #[test]
    fn test_dump_failure_cleans_up() {
        let (_temp, config) = setup(false);
        let factory = ScriptedFactory::new(Script {
            fail_dump: true,
            ..Default::default()
        });
        let notifier = RecordingNotifier::default();

        let err = BackupLifecycle::new(&config, &factory, &notifier)
            .try_run_at("full", fixed_time())
            .unwrap_err();

        assert!(matches!(err, HegemonError::Backup(_)));
        assert!(dir_entries(&config.storage.local_path).is_empty());
    }

    #[test]
    fn test_connect_failure() {
        let (_temp, config) = setup(false);
        let factory = ScriptedFactory::new(Script {
            fail_connect: true,
            ..Default::default()
        });
        let notifier = RecordingNotifier::default();

        let err = BackupLifecycle::new(&config, &factory, &notifier)
            .try_run("full")
            .unwrap_err();
        assert!(matches!(err, HegemonError::Connection(_)));
        assert!(!factory.calls().contains(&"disconnect".to_string()));
    }

    #[test]
    fn test_silent_dump_failure_detected() {
        let (_temp, config) = setup(false);
        let factory = ScriptedFactory::new(Script {
            silent_dump: true,
            ..Default::default()
        });
        let notifier = RecordingNotifier::default();

        let err = BackupLifecycle::new(&config, &factory, &notifier)
            .try_run_at("full", fixed_time())
            .unwrap_err();
        assert!(matches!(err, HegemonError::Storage(_)));
    }

    #[test]
    fn test_stale_staging_file_is_purged() {
        let (_temp, config) = setup(false);
        fs::create_dir_all(&config.storage.local_path).unwrap();
        let stale = config
            .storage
            .local_path
            .join(".tmp_backup_20240309_140507_full.dump");
        fs::write(&stale, b"crash residue").unwrap();

        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();
        let path = BackupLifecycle::new(&config, &factory, &notifier)
            .try_run_at("full", fixed_time())
            .unwrap();

        assert!(!stale.exists());
        assert!(!fs::read(&path).unwrap().starts_with(b"crash residue"));
    }

    #[test]
    fn test_disconnect_failure_is_not_fatal() {
        let (_temp, config) = setup(false);
        let factory = ScriptedFactory::new(Script {
            fail_disconnect: true,
            ..Default::default()
        });
        let notifier = RecordingNotifier::default();

        assert!(BackupLifecycle::new(&config, &factory, &notifier).run("full"));
    }

    #[test]
    fn test_notification_gated_by_flag() {
        let (_temp, mut config) = setup(false);
        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();

        BackupLifecycle::new(&config, &factory, &notifier)
            .try_run_at("full", fixed_time())
            .unwrap();
        assert!(notifier.messages.borrow().is_empty());

        config.logging.enable_notifications = true;
        let path = BackupLifecycle::new(&config, &factory, &notifier)
            .try_run_at("full", fixed_time() + chrono::Duration::seconds(1))
            .unwrap();
        let messages = notifier.messages.borrow();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains(&path.display().to_string()));
    }

    #[test]
    fn test_unsupported_format_fails_before_connecting() {
        let (_temp, mut config) = setup(true);
        config.backup.compression.format = "bzip2".into();
        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();

        let err = BackupLifecycle::new(&config, &factory, &notifier)
            .try_run("full")
            .unwrap_err();
        assert!(matches!(err, HegemonError::Compression(_)));
        assert!(factory.calls().is_empty());
    }
}
