mod applier;
mod confirm;
mod coordinator;
mod error;
mod options;
mod provider;
pub mod providers;
mod snapshot;
mod transaction;
mod validator;

pub use applier::{DiskFiles, FixApplier, LineShifts, SourceFiles, substitute};
pub use confirm::{AlwaysConfirm, FixConfirmer};
pub use coordinator::{FixFailure, FixResult, FixSummary, TransactionCoordinator};
pub use error::{ApplyError, FixError, ProviderError, SnapshotError, ValidationError};
pub use options::{FixOptions, should_apply_fix};
pub use provider::{FixContext, FixProvider, ProviderRegistry};
pub use providers::default_providers;
pub use snapshot::{
    FileSnapshotStore, MANIFEST_FILE_NAME, ManifestEntry, PersistedTransaction, RestoreFailure,
    RollbackReport, sanitize_path,
};
pub use transaction::{FileBackup, FileStats, FixTransaction, TransactionStatus};
pub use validator::{FixValidator, is_structurally_valid};
