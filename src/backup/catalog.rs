//! Catalog of published backup artifacts
//!
//! Lists, verifies and prunes the artifacts in the storage directory.
//! Staging files and anything not named like an artifact are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;

use super::manager::{DUMP_EXTENSION, STAGING_PREFIX};
use super::BackupType;
use crate::compression::verify_gzip;
use crate::config::model::RetentionPolicy;
use crate::error::{HegemonError, HegemonResult};

const ARTIFACT_PREFIX: &str = "backup_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const GZIP_EXTENSION: &str = ".gz";

/// Artifact name without extension: `backup_<YYYYMMDD>_<HHMMSS>_<type>`
pub fn artifact_stem(timestamp: DateTime<Utc>, backup_type: BackupType) -> String {
    format!(
        "{}{}_{}",
        ARTIFACT_PREFIX,
        timestamp.format(TIMESTAMP_FORMAT),
        backup_type
    )
}

/// Parse an artifact file name into (created_at, type, compressed)
pub fn parse_artifact_name(filename: &str) -> Option<(DateTime<Utc>, BackupType, bool)> {
    let rest = filename.strip_prefix(ARTIFACT_PREFIX)?;
    let dump_at = rest.find(DUMP_EXTENSION)?;
    let (stem, tail) = rest.split_at(dump_at);
    let tail = &tail[DUMP_EXTENSION.len()..];
    if !(tail.is_empty() || tail == GZIP_EXTENSION) {
        return None;
    }

    // YYYYMMDD_HHMMSS_<type>
    if stem.len() < 17 || stem.as_bytes()[15] != b'_' {
        return None;
    }
    let (timestamp, backup_type) = stem.split_at(15);
    let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
    let backup_type = BackupType::parse(&backup_type[1..]).ok()?;

    Some((
        DateTime::from_naive_utc_and_offset(naive, Utc),
        backup_type,
        !tail.is_empty(),
    ))
}

/// Metadata about a published artifact
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub filename: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_type")]
    pub backup_type: BackupType,
    pub compressed: bool,
    pub size_bytes: u64,
}

fn serialize_type<S: serde::Serializer>(t: &BackupType, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(t.as_str())
}

/// Outcome of checking one artifact
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Parsed from the file name, when it follows the artifact layout
    pub info: Option<(DateTime<Utc>, BackupType)>,
    /// Decoded size of a compressed artifact
    pub uncompressed_bytes: Option<u64>,
}

impl VerificationReport {
    pub fn summary(&self) -> String {
        match self.uncompressed_bytes {
            Some(n) => format!(
                "OK: {} ({} bytes compressed, {} bytes uncompressed)",
                self.path.display(),
                self.size_bytes,
                n
            ),
            None => format!("OK: {} ({} bytes)", self.path.display(), self.size_bytes),
        }
    }
}

/// Read-only view over the storage directory, plus retention pruning
pub struct BackupCatalog {
    backup_dir: PathBuf,
}

impl BackupCatalog {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// List all artifacts, newest first
    pub fn list(&self) -> HegemonResult<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.backup_dir).map_err(|e| {
            HegemonError::Storage(format!("Failed to read backup directory: {}", e))
        })?;

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                HegemonError::Storage(format!("Failed to read directory entry: {}", e))
            })?;
            let path = entry.path();
            if let Some(info) = self.parse_backup_info(&path) {
                backups.push(info);
            }
        }

        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(backups)
    }

    fn parse_backup_info(&self, path: &Path) -> Option<BackupInfo> {
        let filename = path.file_name()?.to_string_lossy().to_string();
        if filename.starts_with(STAGING_PREFIX) {
            return None;
        }
        let (created_at, backup_type, compressed) = parse_artifact_name(&filename)?;
        let metadata = fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }

        Some(BackupInfo {
            filename,
            path: path.to_path_buf(),
            created_at,
            backup_type,
            compressed,
            size_bytes: metadata.len(),
        })
    }

    pub fn latest(&self) -> HegemonResult<Option<BackupInfo>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Resolve `latest`, an existing path, or a file name in the directory
    pub fn resolve(&self, identifier: &str) -> HegemonResult<PathBuf> {
        if identifier.eq_ignore_ascii_case("latest") {
            return self
                .latest()?
                .map(|b| b.path)
                .ok_or_else(|| HegemonError::Validation("No backups found".into()));
        }

        let path = PathBuf::from(identifier);
        if path.exists() {
            return Ok(path);
        }

        let in_dir = self.backup_dir.join(identifier);
        if in_dir.exists() {
            return Ok(in_dir);
        }

        Err(HegemonError::Validation(format!(
            "Backup file not found: {}",
            identifier
        )))
    }

    /// Check that an artifact exists, is non-empty and, if gzip, decodes
    pub fn verify(&self, path: &Path) -> HegemonResult<VerificationReport> {
        let metadata = fs::metadata(path).map_err(|e| {
            HegemonError::Storage(format!("Backup file not found: {}: {}", path.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(HegemonError::Storage(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }
        if metadata.len() == 0 {
            return Err(HegemonError::Storage(format!(
                "Backup file is empty: {}",
                path.display()
            )));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let info = parse_artifact_name(&filename).map(|(at, t, _)| (at, t));

        let uncompressed_bytes = if filename.ends_with(GZIP_EXTENSION) {
            Some(verify_gzip(path)?)
        } else {
            None
        };

        Ok(VerificationReport {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            info,
            uncompressed_bytes,
        })
    }

    /// Delete artifacts outside the retention policy
    ///
    /// Artifacts older than `days` are removed first, then everything beyond
    /// the newest `max_backups`. A zero limit disables that rule. Returns
    /// the deleted paths.
    pub fn enforce_retention(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> HegemonResult<Vec<PathBuf>> {
        let mut deleted = Vec::new();
        for backup in self.expired(policy, now)? {
            fs::remove_file(&backup.path).map_err(|e| {
                HegemonError::Storage(format!("Failed to delete old backup: {}", e))
            })?;
            deleted.push(backup.path);
        }
        Ok(deleted)
    }

    /// Artifacts that `enforce_retention` would delete
    pub fn expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> HegemonResult<Vec<BackupInfo>> {
        let backups = self.list()?;
        // A cutoff before the earliest representable date keeps everything
        let cutoff = match policy.days {
            0 => None,
            days => now.checked_sub_signed(Duration::days(i64::from(days))),
        };

        let (mut keep, mut expired): (Vec<_>, Vec<_>) = backups
            .into_iter()
            .partition(|b| cutoff.map_or(true, |cutoff| b.created_at >= cutoff));

        if policy.max_backups > 0 && keep.len() > policy.max_backups as usize {
            expired.extend(keep.split_off(policy.max_backups as usize));
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"dump").unwrap();
        path
    }

    #[test]
    fn test_artifact_stem() {
        let at = Utc.with_ymd_and_hms(2025, 11, 27, 14, 30, 22).unwrap();
        assert_eq!(
            artifact_stem(at, BackupType::Full),
            "backup_20251127_143022_full"
        );
    }

    #[test]
    fn test_parse_artifact_name() {
        let (at, t, compressed) =
            parse_artifact_name("backup_20251127_143022_incremental.dump.gz").unwrap();
        assert_eq!((at.year(), at.month(), at.day()), (2025, 11, 27));
        assert_eq!((at.hour(), at.minute(), at.second()), (14, 30, 22));
        assert_eq!(t, BackupType::Incremental);
        assert!(compressed);

        let (_, t, compressed) = parse_artifact_name("backup_20251127_143022_full.dump").unwrap();
        assert_eq!(t, BackupType::Full);
        assert!(!compressed);

        assert!(parse_artifact_name("backup_20251127_143022_bogus.dump").is_none());
        assert!(parse_artifact_name("backup_2025_full.dump").is_none());
        assert!(parse_artifact_name("notes.txt").is_none());
        assert!(parse_artifact_name("backup_20251127_143022_full.dumpster").is_none());
        assert!(parse_artifact_name("backup_20251127_143022_full.dump.bak").is_none());
    }

    #[test]
    fn test_list_ignores_staging_and_foreign_files() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "backup_20240101_000000_full.dump");
        touch(temp.path(), "backup_20240102_000000_full.dump.gz");
        touch(temp.path(), ".tmp_backup_20240103_000000_full.dump");
        touch(temp.path(), "README.md");

        let backups = BackupCatalog::new(temp.path()).list().unwrap();
        let names: Vec<_> = backups.iter().map(|b| b.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "backup_20240102_000000_full.dump.gz",
                "backup_20240101_000000_full.dump"
            ]
        );
        assert!(backups[0].compressed);
    }

    #[test]
    fn test_list_missing_dir() {
        let temp = TempDir::new().unwrap();
        let catalog = BackupCatalog::new(temp.path().join("nope"));
        assert!(catalog.list().unwrap().is_empty());
        assert!(catalog.latest().unwrap().is_none());
    }

    #[test]
    fn test_resolve() {
        let temp = TempDir::new().unwrap();
        let older = touch(temp.path(), "backup_20240101_000000_full.dump");
        let newer = touch(temp.path(), "backup_20240201_000000_full.dump");
        let catalog = BackupCatalog::new(temp.path());

        assert_eq!(catalog.resolve("latest").unwrap(), newer);
        assert_eq!(
            catalog.resolve("backup_20240101_000000_full.dump").unwrap(),
            older
        );
        assert_eq!(catalog.resolve(older.to_str().unwrap()).unwrap(), older);
        assert!(catalog.resolve("missing.dump").unwrap_err().is_validation());
    }

    #[test]
    fn test_verify() {
        let temp = TempDir::new().unwrap();
        let catalog = BackupCatalog::new(temp.path());

        let plain = touch(temp.path(), "backup_20240101_000000_full.dump");
        let report = catalog.verify(&plain).unwrap();
        assert_eq!(report.size_bytes, 4);
        assert_eq!(report.info.unwrap().1, BackupType::Full);
        assert!(report.uncompressed_bytes.is_none());

        let empty = temp.path().join("backup_20240102_000000_full.dump");
        fs::write(&empty, b"").unwrap();
        assert!(matches!(
            catalog.verify(&empty).unwrap_err(),
            HegemonError::Storage(_)
        ));

        let corrupt = touch(temp.path(), "backup_20240103_000000_full.dump.gz");
        assert!(matches!(
            catalog.verify(&corrupt).unwrap_err(),
            HegemonError::Compression(_)
        ));

        assert!(catalog.verify(&temp.path().join("missing")).is_err());
    }

    #[test]
    fn test_retention_by_count() {
        let temp = TempDir::new().unwrap();
        for day in 1..=5 {
            touch(
                temp.path(),
                &format!("backup_202401{:02}_000000_full.dump", day),
            );
        }
        let catalog = BackupCatalog::new(temp.path());
        let now = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        let policy = RetentionPolicy {
            days: 30,
            max_backups: 3,
        };

        let deleted = catalog.enforce_retention(&policy, now).unwrap();
        assert_eq!(deleted.len(), 2);
        let remaining = catalog.list().unwrap();
        assert_eq!(remaining.len(), 3);
        assert_eq!(remaining[2].filename, "backup_20240103_000000_full.dump");
    }

    #[test]
    fn test_retention_by_age() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "backup_20240101_000000_full.dump");
        touch(temp.path(), "backup_20240301_000000_full.dump");
        let catalog = BackupCatalog::new(temp.path());
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();

        let policy = RetentionPolicy {
            days: 30,
            max_backups: 10,
        };
        let deleted = catalog.enforce_retention(&policy, now).unwrap();
        assert_eq!(
            deleted,
            vec![temp.path().join("backup_20240101_000000_full.dump")]
        );

        let unlimited = RetentionPolicy {
            days: 0,
            max_backups: 0,
        };
        assert!(catalog.enforce_retention(&unlimited, now).unwrap().is_empty());
    }

    #[test]
    fn test_retention_huge_days() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "backup_20000101_000000_full.dump");
        touch(temp.path(), "backup_20240301_000000_full.dump");
        let catalog = BackupCatalog::new(temp.path());
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();

        let policy = RetentionPolicy {
            days: 100_000_000,
            max_backups: 10,
        };
        assert!(catalog.expired(&policy, now).unwrap().is_empty());

        let policy = RetentionPolicy {
            days: u32::MAX,
            max_backups: 1,
        };
        let expired = catalog.expired(&policy, now).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].filename, "backup_20000101_000000_full.dump");
    }

    #[test]
    fn test_prune_leaves_foreign_dump_copies() {
        let temp = TempDir::new().unwrap();
        let copy = touch(temp.path(), "backup_20000101_000000_full.dump.bak");
        touch(temp.path(), "backup_20000101_000000_full.dump.gz");
        let catalog = BackupCatalog::new(temp.path());
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();

        let deleted = catalog
            .enforce_retention(&RetentionPolicy::default(), now)
            .unwrap();
        assert_eq!(
            deleted,
            vec![temp.path().join("backup_20000101_000000_full.dump.gz")]
        );
        assert!(copy.exists());
    }
}
