use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use mender_core::Fix;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Applied,
    RolledBack,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::RolledBack => "rolled_back",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub mode: u32,
    pub mtime: SystemTime,
}

/// Pre-transaction state of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBackup {
    /// Path as referenced by the fix changes.
    pub file_path: String,
    pub resolved_path: PathBuf,
    pub content: Vec<u8>,
    pub stats: FileStats,
    /// Where the content was persisted under the backup directory.
    pub backup_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FixTransaction {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub fixes: Vec<Fix>,
    pub backups: Vec<FileBackup>,
    pub status: TransactionStatus,
}

impl FixTransaction {
    pub fn new(fixes: Vec<Fix>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            fixes,
            backups: Vec::new(),
            status: TransactionStatus::Pending,
        }
    }

    pub fn has_backup(&self, resolved_path: &Path) -> bool {
        self.backup_for(resolved_path).is_some()
    }

    pub fn backup_for(&self, resolved_path: &Path) -> Option<&FileBackup> {
        self.backups
            .iter()
            .find(|backup| backup.resolved_path == resolved_path)
    }

    /// ISO-8601 timestamp with `:` replaced so it is safe inside file names.
    pub fn file_timestamp(&self) -> String {
        self.timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace(':', "-")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn new_transactions_start_pending_with_unique_ids() {
        let first = FixTransaction::new(Vec::new());
        let second = FixTransaction::new(Vec::new());

        assert_eq!(first.status, TransactionStatus::Pending);
        assert!(!first.status.is_terminal());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn file_timestamp_replaces_colons() {
        let mut transaction = FixTransaction::new(Vec::new());
        transaction.timestamp = Utc
            .with_ymd_and_hms(2026, 10, 18, 9, 30, 5)
            .single()
            .expect("valid timestamp");

        assert_eq!(transaction.file_timestamp(), "2026-10-18T09-30-05.000Z");
    }
}
