use std::io;
use std::path::PathBuf;

use mender_parse::ParseError;
use thiserror::Error;

/// A provider failed while generating a fix for one issue. The coordinator
/// logs it and moves on to the next issue.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Message(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("fix {fix_id} has no changes")]
    NoChanges { fix_id: String },
    #[error("change {index} of fix {fix_id} has an empty file path")]
    EmptyPath { fix_id: String, index: usize },
    #[error("change {index} of fix {fix_id} points outside the workspace: {path}")]
    OutsideWorkspace {
        fix_id: String,
        index: usize,
        path: String,
    },
    #[error("change {index} of fix {fix_id} references missing file {path}")]
    MissingFile {
        fix_id: String,
        index: usize,
        path: String,
    },
    #[error("change {index} of fix {fix_id} does not alter {path}")]
    NoOp {
        fix_id: String,
        index: usize,
        path: String,
    },
    #[error("fix {fix_id} has confidence {confidence} outside 0.0..=1.0")]
    InvalidConfidence { fix_id: String, confidence: f32 },
    #[error("provider {provider} rejected fix {fix_id}")]
    Rejected { fix_id: String, provider: String },
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("stale content in {path}: expected original text is no longer present")]
    StaleContent { path: String },
    #[error("file {path} no longer exists")]
    MissingFile { path: String },
    #[error("file {path} is not valid UTF-8 text")]
    NotText { path: String },
    #[error("path {path} points outside the workspace")]
    OutsideWorkspace { path: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ApplyError {
    /// I/O failures that are not confined to the file being fixed, such as a
    /// full disk or a read-only filesystem, abort the whole transaction. The
    /// rest are recorded against one fix.
    pub fn is_catastrophic(&self) -> bool {
        match self {
            Self::Read { source, .. } | Self::Write { source, .. } => {
                !is_confined_to_file(source.kind())
            }
            _ => false,
        }
    }
}

fn is_confined_to_file(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::IsADirectory
            | io::ErrorKind::NotADirectory
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::InvalidData
            | io::ErrorKind::FileTooLarge
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::ExecutableFileBusy
    )
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read {path} for backup: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to persist backup of {path} to {}: {source}", backup_file.display())]
    Persist {
        path: String,
        backup_file: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no persisted backups for transaction {0}")]
    UnknownTransaction(String),
    #[error("invalid transaction id {0:?}")]
    InvalidTransactionId(String),
    #[error("invalid backup manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that escape `apply_fixes`. Per-fix failures never appear here; they
/// are reported through `FixResult`.
#[derive(Debug, Error)]
pub enum FixError {
    #[error("transaction {transaction_id} aborted before any write: {source}")]
    Backup {
        transaction_id: String,
        #[source]
        source: SnapshotError,
    },
    #[error(
        "transaction {transaction_id} rolled back after {rolled_back} applied fixes: {source}"
    )]
    RolledBack {
        transaction_id: String,
        rolled_back: usize,
        #[source]
        source: ApplyError,
    },
    #[error(
        "transaction {transaction_id} failed with no backups to restore; {applied} fixes remain applied: {source}"
    )]
    Unrecovered {
        transaction_id: String,
        applied: usize,
        #[source]
        source: ApplyError,
    },
}

impl FixError {
    pub fn transaction_id(&self) -> &str {
        match self {
            Self::Backup { transaction_id, .. }
            | Self::RolledBack { transaction_id, .. }
            | Self::Unrecovered { transaction_id, .. } => transaction_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_error(kind: io::ErrorKind) -> ApplyError {
        ApplyError::Write {
            path: "a.ts".to_owned(),
            source: io::Error::from(kind),
        }
    }

    #[test]
    fn only_workspace_wide_io_failures_are_catastrophic() {
        assert!(write_error(io::ErrorKind::StorageFull).is_catastrophic());
        assert!(write_error(io::ErrorKind::ReadOnlyFilesystem).is_catastrophic());
        assert!(write_error(io::ErrorKind::QuotaExceeded).is_catastrophic());

        assert!(!write_error(io::ErrorKind::PermissionDenied).is_catastrophic());
        assert!(!write_error(io::ErrorKind::IsADirectory).is_catastrophic());
        let read = ApplyError::Read {
            path: "a.ts".to_owned(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(!read.is_catastrophic());
        assert!(
            !ApplyError::StaleContent {
                path: "a.ts".to_owned()
            }
            .is_catastrophic()
        );
    }
}
