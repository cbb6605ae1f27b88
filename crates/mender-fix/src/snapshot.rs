use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SnapshotError;
use crate::transaction::{FileBackup, FileStats, FixTransaction, TransactionStatus};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub restored: Vec<String>,
    pub failed: Vec<RestoreFailure>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreFailure {
    pub file_path: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTransaction {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_path: String,
    pub resolved_path: PathBuf,
    /// File name inside the transaction's backup directory.
    pub backup_file: String,
    pub mode: u32,
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
}

/// Captures and restores byte-exact file state for fix transactions.
///
/// Backups live in memory on the owning transaction and on disk under
/// `{backup_dir}/{transaction_id}/`. Files there are created once and never
/// overwritten; only the manifest is rewritten as backups are added.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    backup_dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn transaction_dir(&self, transaction_id: &str) -> PathBuf {
        self.backup_dir.join(transaction_id)
    }

    /// Backs up `resolved_path` once per transaction. Returns `false` when the
    /// transaction already holds a backup for that path.
    pub fn backup(
        &self,
        transaction: &mut FixTransaction,
        file_path: &str,
        resolved_path: &Path,
    ) -> Result<bool, SnapshotError> {
        if transaction.has_backup(resolved_path) {
            return Ok(false);
        }

        let read_error = |source: io::Error| SnapshotError::Read {
            path: file_path.to_owned(),
            source,
        };
        let metadata = fs::metadata(resolved_path).map_err(read_error)?;
        let content = fs::read(resolved_path).map_err(read_error)?;
        let stats = FileStats {
            mode: mode_of(&metadata),
            mtime: metadata.modified().map_err(read_error)?,
        };

        let dir = self.transaction_dir(&transaction.id);
        let file_name = format!(
            "{}_{}",
            transaction.file_timestamp(),
            sanitize_path(file_path)
        );
        let backup_file =
            persist_new(&dir, &file_name, &content).map_err(|(backup_file, source)| {
                SnapshotError::Persist {
                    path: file_path.to_owned(),
                    backup_file,
                    source,
                }
            })?;

        debug!(
            transaction_id = %transaction.id,
            file = file_path,
            backup = %backup_file.display(),
            bytes = content.len(),
            "backed up file"
        );

        transaction.backups.push(FileBackup {
            file_path: file_path.to_owned(),
            resolved_path: resolved_path.to_path_buf(),
            content,
            stats,
            backup_file,
        });
        self.write_manifest(transaction)?;

        Ok(true)
    }

    /// Restores every backup of the transaction, continuing past individual
    /// failures. The transaction ends `rolled_back` regardless; callers that
    /// need certainty inspect the report.
    pub fn rollback(&self, transaction: &mut FixTransaction) -> RollbackReport {
        let mut report = RollbackReport::default();

        for backup in &transaction.backups {
            match restore_file(&backup.resolved_path, &backup.content, backup.stats) {
                Ok(()) => {
                    debug!(transaction_id = %transaction.id, file = %backup.file_path, "restored file");
                    report.restored.push(backup.file_path.clone());
                }
                Err(err) => {
                    warn!(
                        transaction_id = %transaction.id,
                        file = %backup.file_path,
                        error = %err,
                        "failed to restore file from backup"
                    );
                    report.failed.push(RestoreFailure {
                        file_path: backup.file_path.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        transaction.status = TransactionStatus::RolledBack;
        info!(
            transaction_id = %transaction.id,
            restored = report.restored.len(),
            failed = report.failed.len(),
            "transaction rolled back"
        );
        report
    }

    pub fn load_persisted(&self, transaction_id: &str) -> Result<PersistedTransaction, SnapshotError> {
        if !is_transaction_id(transaction_id) {
            return Err(SnapshotError::InvalidTransactionId(
                transaction_id.to_owned(),
            ));
        }
        let manifest_path = self
            .transaction_dir(transaction_id)
            .join(MANIFEST_FILE_NAME);
        let raw = match fs::read_to_string(&manifest_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(SnapshotError::UnknownTransaction(transaction_id.to_owned()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Restores files from a transaction persisted on disk, with the same
    /// best-effort semantics as [`FileSnapshotStore::rollback`].
    pub fn restore_persisted(&self, transaction_id: &str) -> Result<RollbackReport, SnapshotError> {
        let persisted = self.load_persisted(transaction_id)?;
        let dir = self.transaction_dir(transaction_id);
        let mut report = RollbackReport::default();

        for entry in &persisted.entries {
            let stats = FileStats {
                mode: entry.mode,
                mtime: UNIX_EPOCH + Duration::new(entry.mtime_secs, entry.mtime_nanos),
            };
            let restored = fs::read(dir.join(&entry.backup_file))
                .and_then(|content| restore_file(&entry.resolved_path, &content, stats));
            match restored {
                Ok(()) => report.restored.push(entry.file_path.clone()),
                Err(err) => {
                    warn!(
                        transaction_id,
                        file = %entry.file_path,
                        error = %err,
                        "failed to restore persisted backup"
                    );
                    report.failed.push(RestoreFailure {
                        file_path: entry.file_path.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            transaction_id,
            restored = report.restored.len(),
            failed = report.failed.len(),
            "restored persisted transaction"
        );
        Ok(report)
    }

    /// Transactions with a readable manifest, oldest first.
    pub fn list_persisted(&self) -> Result<Vec<PersistedTransaction>, SnapshotError> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut transactions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let transaction_id = entry.file_name().to_string_lossy().into_owned();
            match self.load_persisted(&transaction_id) {
                Ok(persisted) => transactions.push(persisted),
                Err(
                    SnapshotError::UnknownTransaction(_) | SnapshotError::InvalidTransactionId(_),
                ) => continue,
                Err(err) => {
                    warn!(transaction_id = %transaction_id, error = %err, "skipping unreadable backup manifest");
                }
            }
        }

        transactions.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(transactions)
    }

    fn write_manifest(&self, transaction: &FixTransaction) -> Result<(), SnapshotError> {
        let entries = transaction
            .backups
            .iter()
            .map(|backup| {
                let since_epoch = backup
                    .stats
                    .mtime
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                ManifestEntry {
                    file_path: backup.file_path.clone(),
                    resolved_path: backup.resolved_path.clone(),
                    backup_file: backup
                        .backup_file
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    mode: backup.stats.mode,
                    mtime_secs: since_epoch.as_secs(),
                    mtime_nanos: since_epoch.subsec_nanos(),
                }
            })
            .collect();
        let manifest = PersistedTransaction {
            transaction_id: transaction.id.clone(),
            timestamp: transaction.timestamp,
            entries,
        };

        let path = self.transaction_dir(&transaction.id).join(MANIFEST_FILE_NAME);
        fs::write(path, serde_json::to_vec_pretty(&manifest)?)?;
        Ok(())
    }
}

/// Replaces path separators so a workspace path becomes a single file name.
/// Transaction ids name a single directory under the backup dir.
fn is_transaction_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn sanitize_path(file_path: &str) -> String {
    file_path.replace(['/', '\\'], "_")
}

/// Creates `dir/name` without ever overwriting. Distinct paths that sanitize to
/// the same name get a numeric suffix.
fn persist_new(dir: &Path, name: &str, content: &[u8]) -> Result<PathBuf, (PathBuf, io::Error)> {
    fs::create_dir_all(dir).map_err(|err| (dir.to_path_buf(), err))?;

    let mut candidate = dir.join(name);
    let mut suffix = 1;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut file) => {
                file.write_all(content)
                    .and_then(|()| file.sync_all())
                    .map_err(|err| (candidate.clone(), err))?;
                return Ok(candidate);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                candidate = dir.join(format!("{name}.{suffix}"));
                suffix += 1;
            }
            Err(err) => return Err((candidate, err)),
        }
    }
}

/// Writes content, then modification time, then permission bits. Permissions
/// go last so a read-only original does not block the mtime update.
fn restore_file(path: &Path, content: &[u8], stats: FileStats) -> io::Result<()> {
    fs::write(path, content)?;
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_modified(stats.mtime)?;
    drop(file);
    fs::set_permissions(path, permissions_for(path, stats.mode)?)?;
    Ok(())
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
fn permissions_for(_path: &Path, mode: u32) -> io::Result<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn permissions_for(path: &Path, mode: u32) -> io::Result<fs::Permissions> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(mode & 0o222 == 0);
    Ok(permissions)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn store_in(root: &Path) -> FileSnapshotStore {
        FileSnapshotStore::new(root.join(".mender/backups"))
    }

    #[test]
    fn backup_is_taken_once_per_path() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("a.ts");
        fs::write(&file, "let x = 1;  \n").expect("write file");

        let store = store_in(temp.path());
        let mut transaction = FixTransaction::new(Vec::new());

        assert!(store.backup(&mut transaction, "a.ts", &file).expect("first backup"));
        fs::write(&file, "changed\n").expect("mutate file");
        assert!(!store.backup(&mut transaction, "a.ts", &file).expect("second backup"));

        assert_eq!(transaction.backups.len(), 1);
        assert_eq!(transaction.backups[0].content, b"let x = 1;  \n");
    }

    #[test]
    fn persisted_backup_follows_naming_contract() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src/util")).expect("create dirs");
        let file = temp.path().join("src/util/a.ts");
        fs::write(&file, "original\n").expect("write file");

        let store = store_in(temp.path());
        let mut transaction = FixTransaction::new(Vec::new());
        store
            .backup(&mut transaction, "src/util/a.ts", &file)
            .expect("backup");

        let expected = store
            .transaction_dir(&transaction.id)
            .join(format!("{}_src_util_a.ts", transaction.file_timestamp()));
        assert_eq!(transaction.backups[0].backup_file, expected);
        assert_eq!(fs::read(&expected).expect("read backup"), b"original\n");
        assert!(
            store
                .transaction_dir(&transaction.id)
                .join(MANIFEST_FILE_NAME)
                .exists()
        );
    }

    #[test]
    fn colliding_sanitized_names_are_not_overwritten() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("a")).expect("create a");
        fs::write(temp.path().join("a/b_c.ts"), "first").expect("write first");
        fs::create_dir_all(temp.path().join("a_b")).expect("create a_b");
        fs::write(temp.path().join("a_b/c.ts"), "second").expect("write second");

        let store = store_in(temp.path());
        let mut transaction = FixTransaction::new(Vec::new());
        store
            .backup(&mut transaction, "a/b_c.ts", &temp.path().join("a/b_c.ts"))
            .expect("backup first");
        store
            .backup(&mut transaction, "a_b/c.ts", &temp.path().join("a_b/c.ts"))
            .expect("backup second");

        let first = &transaction.backups[0].backup_file;
        let second = &transaction.backups[1].backup_file;
        assert_ne!(first, second);
        assert_eq!(fs::read(first).expect("read first"), b"first");
        assert_eq!(fs::read(second).expect("read second"), b"second");
    }

    #[test]
    fn backup_of_missing_file_fails() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(temp.path());
        let mut transaction = FixTransaction::new(Vec::new());

        let err = store
            .backup(&mut transaction, "missing.ts", &temp.path().join("missing.ts"))
            .expect_err("missing file cannot be backed up");
        assert!(matches!(err, SnapshotError::Read { .. }));
        assert!(transaction.backups.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn rollback_restores_content_mode_and_mtime() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("a.rs");
        fs::write(&file, "fn main() {}\n").expect("write file");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).expect("chmod");
        let old_mtime = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        OpenOptions::new()
            .write(true)
            .open(&file)
            .and_then(|handle| handle.set_modified(old_mtime))
            .expect("set mtime");

        let store = store_in(temp.path());
        let mut transaction = FixTransaction::new(Vec::new());
        store.backup(&mut transaction, "a.rs", &file).expect("backup");

        fs::write(&file, "fn main() { changed() }\n").expect("mutate");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).expect("chmod");

        let report = store.rollback(&mut transaction);

        assert!(report.is_complete());
        assert_eq!(transaction.status, TransactionStatus::RolledBack);
        assert_eq!(fs::read_to_string(&file).expect("read"), "fn main() {}\n");
        let metadata = fs::metadata(&file).expect("metadata");
        assert_eq!(metadata.permissions().mode() & 0o777, 0o640);
        assert_eq!(metadata.modified().expect("mtime"), old_mtime);
    }

    #[test]
    fn rollback_continues_past_unrestorable_files() {
        let temp = tempdir().expect("tempdir");
        let first = temp.path().join("first.ts");
        let second = temp.path().join("second.ts");
        fs::write(&first, "one").expect("write first");
        fs::write(&second, "two").expect("write second");

        let store = store_in(temp.path());
        let mut transaction = FixTransaction::new(Vec::new());
        store.backup(&mut transaction, "first.ts", &first).expect("backup first");
        store
            .backup(&mut transaction, "second.ts", &second)
            .expect("backup second");

        fs::remove_file(&first).expect("remove first");
        fs::create_dir(&first).expect("replace first with a directory");
        fs::write(&second, "changed").expect("mutate second");

        let report = store.rollback(&mut transaction);

        assert_eq!(report.restored, vec!["second.ts"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file_path, "first.ts");
        assert_eq!(transaction.status, TransactionStatus::RolledBack);
        assert_eq!(fs::read_to_string(&second).expect("read second"), "two");
    }

    #[test]
    fn restore_persisted_uses_manifest_on_disk() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("a.py");
        fs::write(&file, "import os\n").expect("write file");

        let store = store_in(temp.path());
        let mut transaction = FixTransaction::new(Vec::new());
        store.backup(&mut transaction, "a.py", &file).expect("backup");
        fs::write(&file, "").expect("truncate");

        let listed = store.list_persisted().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].transaction_id, transaction.id);
        assert_eq!(listed[0].entries[0].file_path, "a.py");

        let report = store.restore_persisted(&transaction.id).expect("restore");
        assert_eq!(report.restored, vec!["a.py"]);
        assert_eq!(fs::read_to_string(&file).expect("read"), "import os\n");

        let err = store
            .restore_persisted("does-not-exist")
            .expect_err("unknown transaction");
        assert!(matches!(err, SnapshotError::UnknownTransaction(_)));
    }

    #[test]
    fn list_persisted_is_empty_without_backup_dir() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(temp.path());
        assert!(store.list_persisted().expect("list").is_empty());
    }

    #[test]
    fn sanitize_path_replaces_separators() {
        assert_eq!(sanitize_path("src/app/main.ts"), "src_app_main.ts");
        assert_eq!(sanitize_path("src\\lib.rs"), "src_lib.rs");
    }

    #[test]
    fn restore_refuses_ids_that_leave_the_backup_dir() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(temp.path());

        for id in ["../escape", "a/b", ""] {
            assert!(matches!(
                store.restore_persisted(id),
                Err(SnapshotError::InvalidTransactionId(_))
            ));
        }
    }
}
