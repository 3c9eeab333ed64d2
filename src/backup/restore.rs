//! Restore lifecycle
//!
//! Loads one artifact back into the configured database. A compressed
//! artifact is first expanded next to itself with the codec extension
//! stripped; that intermediate file is removed when the run ends. Nothing
//! here rolls back a restore the engine only partially applied.

use std::path::{Path, PathBuf};

use tracing::{error, info, info_span, warn, Span};

use super::{ensure_kind, ConnectionGuard, TempFileGuard};
use crate::compression::{compressor_for, Compressor};
use crate::config::model::{BackupConfig, ConfigModel, DatabaseConfig, LoggingConfig};
use crate::connection::ConnectionFactory;
use crate::error::{ErrorKind, HegemonError, HegemonResult};
use crate::notify::NotificationSender;

/// Orchestrates one restore run
pub struct RestoreLifecycle<'a> {
    database: &'a DatabaseConfig,
    backup: &'a BackupConfig,
    logging: &'a LoggingConfig,
    factory: &'a dyn ConnectionFactory,
    notifier: &'a dyn NotificationSender,
    compressor: Option<&'a dyn Compressor>,
    span: Span,
}

impl<'a> RestoreLifecycle<'a> {
    pub fn new(
        config: &'a ConfigModel,
        factory: &'a dyn ConnectionFactory,
        notifier: &'a dyn NotificationSender,
    ) -> Self {
        Self {
            database: &config.database,
            backup: &config.backup,
            logging: &config.logging,
            factory,
            notifier,
            compressor: None,
            span: info_span!("restore", component = "BackupManager"),
        }
    }

    /// Log every event of the run inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Use `compressor` instead of the one built from the compression section
    pub fn with_compressor(mut self, compressor: &'a dyn Compressor) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Run a restore, logging any failure
    pub fn run(&self, backup_path: &Path) -> bool {
        match self.try_run(backup_path) {
            Ok(()) => true,
            Err(e) => {
                let _guard = self.span.enter();
                error!(error = %e, "Restore failed");
                false
            }
        }
    }

    pub fn try_run(&self, backup_path: &Path) -> HegemonResult<()> {
        let _guard = self.span.enter();

        if backup_path.as_os_str().is_empty() {
            return Err(HegemonError::Validation("Backup path cannot be empty".into()));
        }
        if !backup_path.is_file() {
            return Err(HegemonError::Validation(format!(
                "Backup file not found: {}",
                backup_path.display()
            )));
        }

        let owned_compressor;
        let compressor: Option<&dyn Compressor> = if !self.backup.compression.enabled {
            None
        } else if let Some(c) = self.compressor {
            Some(c)
        } else {
            owned_compressor = compressor_for(&self.backup.compression)?;
            owned_compressor.as_deref()
        };

        info!(path = %backup_path.display(), "Starting restore");

        let mut connection = ConnectionGuard::new(self.factory.open(self.database)?);
        connection.connect(self.database)?;

        let mut intermediate: Option<TempFileGuard> = None;
        if let Some(codec) = compressor {
            if let Some(stripped) = strip_extension(backup_path, codec.file_extension()) {
                if stripped.exists() {
                    return Err(HegemonError::Storage(format!(
                        "Refusing to overwrite existing file {}; if it was left by an \
                         interrupted restore, delete it and retry",
                        stripped.display()
                    )));
                }
                let guard = TempFileGuard::new(stripped);
                codec
                    .decompress_file(backup_path, guard.path())
                    .map_err(|e| {
                        ensure_kind(e, ErrorKind::Compression, |m| {
                            HegemonError::Compression(format!(
                                "Failed to decompress backup file: {}",
                                m
                            ))
                        })
                    })?;
                intermediate = Some(guard);
            }
        }

        let restore_path = intermediate
            .as_ref()
            .map_or(backup_path, |guard| guard.path());

        connection
            .conn()
            .restore_backup(restore_path)
            .map_err(|e| {
                ensure_kind(e, ErrorKind::Restore, |m| {
                    HegemonError::Restore(format!("Failed to restore from backup: {}", m))
                })
            })?;

        if let Some(guard) = intermediate.take() {
            if let Err(e) = guard.remove() {
                warn!(
                    path = %guard.path().display(),
                    error = %e,
                    "Failed to remove temporary decompressed file"
                );
            }
        }

        connection.close();

        info!(path = %backup_path.display(), "Restore completed successfully");
        // Unlike backups, restores do not check `enable_notifications` here;
        // the sender still applies its own gate.
        self.notifier.send_if_needed(
            self.logging,
            &format!("Restore succeeded from: {}", backup_path.display()),
        );

        Ok(())
    }
}

/// `path` with `extension` removed, if the file name ends with it
fn strip_extension(path: &Path, extension: &str) -> Option<PathBuf> {
    if extension.is_empty() {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(extension)?;
    if stem.is_empty() {
        return None;
    }
    Some(path.with_file_name(stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::tests::{dir_entries, BrokenCompressor, Script, ScriptedFactory};
    use crate::compression::GzipCompressor;
    use crate::config::model::tests::sqlite_model;
    use crate::notify::tests::RecordingNotifier;
    use std::fs;
    use tempfile::TempDir;

    fn setup(compress: bool) -> (TempDir, ConfigModel) {
        let temp = TempDir::new().unwrap();
        let mut config = sqlite_model("/data/app.db", temp.path().to_path_buf());
        config.backup.compression.enabled = compress;
        (temp, config)
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(
            strip_extension(Path::new("/b/backup_x.dump.gz"), ".gz"),
            Some(PathBuf::from("/b/backup_x.dump"))
        );
        assert_eq!(strip_extension(Path::new("/b/backup_x.dump"), ".gz"), None);
        assert_eq!(strip_extension(Path::new("/b/.gz"), ".gz"), None);
    }

    #[test]
    fn test_restore_uncompressed() {
        let (temp, config) = setup(false);
        let dump = temp.path().join("backup_20240101_000000_full.dump");
        fs::write(&dump, b"plain dump").unwrap();

        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();
        RestoreLifecycle::new(&config, &factory, &notifier)
            .try_run(&dump)
            .unwrap();

        let log = factory.log.borrow();
        assert_eq!(log.restored.as_deref(), Some(&b"plain dump"[..]));
        assert!(log.calls.contains(&format!("restore:{}", dump.display())));
    }

    #[test]
    fn test_restore_decompresses_matching_extension() {
        let (temp, config) = setup(true);
        let dump = temp.path().join("backup_20240101_000000_full.dump");
        let gz = temp.path().join("backup_20240101_000000_full.dump.gz");
        fs::write(&dump, b"compressed dump").unwrap();
        GzipCompressor::default().compress_file(&dump, &gz).unwrap();
        fs::remove_file(&dump).unwrap();

        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();
        RestoreLifecycle::new(&config, &factory, &notifier)
            .try_run(&gz)
            .unwrap();

        let log = factory.log.borrow();
        assert_eq!(log.restored.as_deref(), Some(&b"compressed dump"[..]));
        assert!(log.calls.contains(&format!("restore:{}", dump.display())));
        drop(log);
        assert_eq!(
            dir_entries(temp.path()),
            vec!["backup_20240101_000000_full.dump.gz".to_string()]
        );
    }

    #[test]
    fn test_non_matching_extension_not_decompressed() {
        let (temp, config) = setup(true);
        let dump = temp.path().join("backup_20240101_000000_full.dump");
        fs::write(&dump, b"plain dump").unwrap();

        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();
        let broken = BrokenCompressor;
        RestoreLifecycle::new(&config, &factory, &notifier)
            .with_compressor(&broken)
            .try_run(&dump)
            .unwrap();

        assert_eq!(
            factory.log.borrow().restored.as_deref(),
            Some(&b"plain dump"[..])
        );
    }

    #[test]
    fn test_decompression_failure() {
        let (temp, config) = setup(true);
        let gz = temp.path().join("backup_20240101_000000_full.dump.gz");
        fs::write(&gz, b"not really gzip").unwrap();

        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();
        let err = RestoreLifecycle::new(&config, &factory, &notifier)
            .try_run(&gz)
            .unwrap_err();

        assert!(matches!(err, HegemonError::Compression(_)));
        assert!(!temp.path().join("backup_20240101_000000_full.dump").exists());
        assert!(!factory
            .calls()
            .iter()
            .any(|c| c.starts_with("restore:")));
    }

    #[test]
    fn test_missing_file_is_validation_error() {
        let (temp, config) = setup(false);
        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();
        let lifecycle = RestoreLifecycle::new(&config, &factory, &notifier);

        assert!(lifecycle
            .try_run(&temp.path().join("missing.dump"))
            .unwrap_err()
            .is_validation());
        assert!(lifecycle.try_run(Path::new("")).unwrap_err().is_validation());
        assert!(factory.calls().is_empty());
    }

    #[test]
    fn test_restore_failure_removes_intermediate() {
        let (temp, config) = setup(true);
        let dump = temp.path().join("db.dump");
        let gz = temp.path().join("db.dump.gz");
        fs::write(&dump, b"data").unwrap();
        GzipCompressor::default().compress_file(&dump, &gz).unwrap();
        fs::remove_file(&dump).unwrap();

        let factory = ScriptedFactory::new(Script {
            fail_restore: true,
            ..Default::default()
        });
        let notifier = RecordingNotifier::default();
        let lifecycle = RestoreLifecycle::new(&config, &factory, &notifier);

        assert!(!lifecycle.run(&gz));
        assert!(!dump.exists());
        assert!(notifier.messages.borrow().is_empty());
    }

    #[test]
    fn test_refuses_to_clobber_sibling() {
        let (temp, config) = setup(true);
        let dump = temp.path().join("db.dump");
        let gz = temp.path().join("db.dump.gz");
        fs::write(&dump, b"keep me").unwrap();
        GzipCompressor::default().compress_file(&dump, &gz).unwrap();

        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();
        let err = RestoreLifecycle::new(&config, &factory, &notifier)
            .try_run(&gz)
            .unwrap_err();

        assert!(matches!(err, HegemonError::Storage(_)));
        let message = err.to_string();
        assert!(message.contains(&dump.display().to_string()));
        assert!(message.contains("delete it and retry"));
        assert_eq!(fs::read(&dump).unwrap(), b"keep me");
        assert!(!factory.calls().iter().any(|c| c.starts_with("restore:")));
    }

    #[test]
    fn test_notification_not_gated_by_flag() {
        let (temp, config) = setup(false);
        assert!(!config.logging.enable_notifications);
        let dump = temp.path().join("db.dump");
        fs::write(&dump, b"data").unwrap();

        let factory = ScriptedFactory::new(Script::default());
        let notifier = RecordingNotifier::default();
        assert!(RestoreLifecycle::new(&config, &factory, &notifier).run(&dump));

        let messages = notifier.messages.borrow();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Restore succeeded from:"));
    }

    #[test]
    fn test_disconnect_failure_is_not_fatal() {
        let (temp, config) = setup(false);
        let dump = temp.path().join("db.dump");
        fs::write(&dump, b"data").unwrap();

        let factory = ScriptedFactory::new(Script {
            fail_disconnect: true,
            ..Default::default()
        });
        let notifier = RecordingNotifier::default();
        assert!(RestoreLifecycle::new(&config, &factory, &notifier).run(&dump));
    }
}
