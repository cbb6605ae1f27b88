use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use mender_config::{MenderConfig, ProvidersConfig, backup_dir};
use mender_core::{Fix, Issue, Language};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::applier::{FixApplier, LineShifts, SourceFiles};
use crate::confirm::{AlwaysConfirm, FixConfirmer};
use crate::error::{ApplyError, FixError};
use crate::options::{FixOptions, should_apply_fix};
use crate::provider::{FixContext, FixProvider, ProviderRegistry};
use crate::providers::default_providers;
use crate::snapshot::FileSnapshotStore;
use crate::transaction::{FixTransaction, TransactionStatus};
use crate::validator::{FixValidator, is_structurally_valid};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixResult {
    pub success: bool,
    pub transaction_id: String,
    pub applied_fixes: Vec<Fix>,
    pub failed_fixes: Vec<Fix>,
    pub skipped_fixes: Vec<Fix>,
    pub errors: Vec<FixFailure>,
    pub summary: FixSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixFailure {
    pub fix_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FixSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rolled_back: usize,
}

/// Turns issues into fixes and applies them as one backed-up transaction.
///
/// Each coordinator owns its provider registry and the history of every
/// transaction it ran.
pub struct TransactionCoordinator {
    workspace_root: PathBuf,
    registry: ProviderRegistry,
    providers_config: ProvidersConfig,
    snapshots: FileSnapshotStore,
    applier: FixApplier,
    validator: FixValidator,
    confirmer: Box<dyn FixConfirmer>,
    history: Vec<FixTransaction>,
}

impl TransactionCoordinator {
    /// Coordinator with no providers registered.
    pub fn new(workspace_root: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            registry: ProviderRegistry::new(),
            providers_config: ProvidersConfig::default(),
            snapshots: FileSnapshotStore::new(backup_dir),
            applier: FixApplier::new(workspace_root.clone()),
            validator: FixValidator::new(workspace_root.clone()),
            confirmer: Box::new(AlwaysConfirm),
            history: Vec::new(),
            workspace_root,
        }
    }

    /// Coordinator with the built-in providers that `config` leaves enabled.
    pub fn from_config(workspace_root: impl Into<PathBuf>, config: &MenderConfig) -> Self {
        let workspace_root = workspace_root.into();
        let backups = backup_dir(&workspace_root, &config.fix);
        let mut coordinator = Self::new(workspace_root, backups);
        coordinator.providers_config = config.providers.clone();
        for provider in default_providers(&config.providers) {
            coordinator.register_provider(provider);
        }
        coordinator
    }

    pub fn with_confirmer(mut self, confirmer: impl FixConfirmer + 'static) -> Self {
        self.confirmer = Box::new(confirmer);
        self
    }

    /// Routes fix reads and writes through `files` instead of the disk.
    pub fn with_source_files(mut self, files: impl SourceFiles + 'static) -> Self {
        self.applier = FixApplier::new(self.workspace_root.clone()).with_files(files);
        self
    }

    pub fn register_provider(&mut self, provider: Box<dyn FixProvider>) {
        info!(provider = provider.name(), "registered fix provider");
        self.registry.register(provider);
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn transaction(&self, id: &str) -> Option<&FixTransaction> {
        self.history.iter().find(|transaction| transaction.id == id)
    }

    pub fn transactions(&self) -> &[FixTransaction] {
        &self.history
    }

    /// Fixes for `issues` that pass validation and the option filters, in issue
    /// order. Provider failures are logged and skip only their issue.
    pub fn generate_fixes(&self, issues: &[Issue], options: &FixOptions) -> Vec<Fix> {
        let mut fixes = Vec::new();
        let mut contents: HashMap<&str, String> = HashMap::new();

        for issue in issues {
            if !issue.auto_fix_available {
                continue;
            }
            let Some(provider) = self.registry.provider_for(issue) else {
                debug!(issue_id = %issue.id, issue_type = %issue.issue_type, "no provider for issue type");
                continue;
            };

            if !contents.contains_key(issue.file_path.as_str()) {
                let path = match self.applier.resolve(&issue.file_path) {
                    Ok(path) => path,
                    Err(err) => {
                        warn!(issue_id = %issue.id, error = %err, "skipping issue");
                        continue;
                    }
                };
                match fs::read_to_string(path) {
                    Ok(content) => {
                        contents.insert(issue.file_path.as_str(), content);
                    }
                    Err(err) => {
                        warn!(issue_id = %issue.id, file = %issue.file_path, error = %err, "cannot read file for issue");
                        continue;
                    }
                }
            }
            let Some(content) = contents.get(issue.file_path.as_str()) else {
                continue;
            };

            let context = FixContext {
                file_content: content,
                file_path: &issue.file_path,
                language: Language::for_path(&issue.file_path),
                issue,
                config: &self.providers_config,
            };
            let fix = match provider.generate_fix(issue, &context) {
                Ok(Some(fix)) => fix,
                Ok(None) => {
                    debug!(issue_id = %issue.id, provider = provider.name(), "provider produced no fix");
                    continue;
                }
                Err(err) => {
                    warn!(issue_id = %issue.id, provider = provider.name(), error = %err, "fix generation failed");
                    continue;
                }
            };

            if let Err(err) = self.validator.validate(&fix, Some(provider)) {
                warn!(issue_id = %issue.id, fix_id = %fix.id, error = %err, "generated fix failed validation");
                continue;
            }
            if !should_apply_fix(&fix, options) {
                debug!(
                    fix_id = %fix.id,
                    risk = fix.risk.as_str(),
                    confidence = fix.confidence,
                    "fix filtered out by options"
                );
                continue;
            }
            fixes.push(fix);
        }

        info!(issues = issues.len(), fixes = fixes.len(), "generated fixes");
        fixes
    }

    /// Applies `fixes` in order inside a new transaction.
    ///
    /// Per-fix problems are reported in the returned [`FixResult`]. Backup
    /// failures abort before any write; read or write I/O failures during
    /// application roll every backed-up file back and are returned as errors.
    pub fn apply_fixes(
        &mut self,
        fixes: Vec<Fix>,
        options: &FixOptions,
    ) -> Result<FixResult, FixError> {
        let mut transaction = FixTransaction::new(fixes);
        info!(
            transaction_id = %transaction.id,
            fixes = transaction.fixes.len(),
            dry_run = options.dry_run,
            "starting fix transaction"
        );

        // Provider-specific checks are left to validate_after_fix here.
        let rejected: Vec<Option<String>> = transaction
            .fixes
            .iter()
            .map(|fix| self.validator.validate(fix, None).err().map(|err| err.to_string()))
            .collect();

        if options.create_backup && !options.dry_run {
            let mut paths: Vec<String> = Vec::new();
            for (fix, rejection) in transaction.fixes.iter().zip(&rejected) {
                if rejection.is_some() {
                    continue;
                }
                for path in fix.touched_files() {
                    if !paths.iter().any(|seen| seen == path) {
                        paths.push(path.to_owned());
                    }
                }
            }
            for path in &paths {
                // Validation above rejected paths outside the workspace.
                let Ok(resolved) = self.applier.resolve(path) else {
                    continue;
                };
                if let Err(source) = self.snapshots.backup(&mut transaction, path, &resolved) {
                    error!(transaction_id = %transaction.id, file = %path, error = %source, "backup failed; nothing applied");
                    transaction.status = TransactionStatus::Failed;
                    let transaction_id = transaction.id.clone();
                    self.history.push(transaction);
                    return Err(FixError::Backup {
                        transaction_id,
                        source,
                    });
                }
            }
        }

        let mut result = FixResult {
            success: true,
            transaction_id: transaction.id.clone(),
            applied_fixes: Vec::new(),
            failed_fixes: Vec::new(),
            skipped_fixes: Vec::new(),
            errors: Vec::new(),
            summary: FixSummary {
                total: transaction.fixes.len(),
                ..FixSummary::default()
            },
        };
        let mut overlay = HashMap::new();
        let mut shifts = LineShifts::default();
        // Fixes whose changes reached disk, including ones that later fail
        // validation; rollback undoes all of them.
        let mut written = 0;
        let fixes = transaction.fixes.clone();

        for (fix, rejection) in fixes.iter().zip(rejected) {
            if let Some(message) = rejection {
                record_failure(&mut result, fix, message);
                continue;
            }
            if options.interactive && !self.confirmer.confirm(fix) {
                debug!(fix_id = %fix.id, "fix declined");
                result.skipped_fixes.push(fix.clone());
                result.summary.skipped += 1;
                continue;
            }

            let outcome = if options.dry_run {
                self.applier.simulate(fix, &mut overlay, &mut shifts)
            } else {
                self.applier.apply(fix, &mut shifts)
            };
            match outcome {
                Ok(()) => written += 1,
                Err(err) if err.is_catastrophic() && !options.dry_run => {
                    return Err(self.abort(transaction, written, err));
                }
                Err(err) => {
                    warn!(transaction_id = %result.transaction_id, fix_id = %fix.id, error = %err, "fix failed");
                    record_failure(&mut result, fix, err.to_string());
                    continue;
                }
            }

            if options.validate_after_fix && !self.validate_applied(fix) {
                warn!(fix_id = %fix.id, provider = %fix.provider, "fix failed post-apply validation");
                record_failure(
                    &mut result,
                    fix,
                    format!("provider {} rejected the applied fix", fix.provider),
                );
                continue;
            }

            debug!(fix_id = %fix.id, provider = %fix.provider, "fix applied");
            result.applied_fixes.push(fix.clone());
            result.summary.successful += 1;
        }

        transaction.status = TransactionStatus::Applied;
        result.success = result.failed_fixes.is_empty();
        info!(
            transaction_id = %transaction.id,
            successful = result.summary.successful,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            "fix transaction applied"
        );
        self.history.push(transaction);
        Ok(result)
    }

    fn validate_applied(&self, fix: &Fix) -> bool {
        match self.registry.get(&fix.provider) {
            Some(provider) => provider.validate_fix(fix),
            None => is_structurally_valid(fix),
        }
    }

    fn abort(
        &mut self,
        mut transaction: FixTransaction,
        applied: usize,
        source: ApplyError,
    ) -> FixError {
        error!(transaction_id = %transaction.id, error = %source, "catastrophic failure while applying fixes");
        transaction.status = TransactionStatus::Failed;
        let transaction_id = transaction.id.clone();

        if transaction.backups.is_empty() {
            self.history.push(transaction);
            return FixError::Unrecovered {
                transaction_id,
                applied,
                source,
            };
        }

        let report = self.snapshots.rollback(&mut transaction);
        if !report.is_complete() {
            error!(
                transaction_id = %transaction_id,
                failed = report.failed.len(),
                "rollback could not restore every file"
            );
        }
        self.history.push(transaction);
        FixError::RolledBack {
            transaction_id,
            rolled_back: applied,
            source,
        }
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("workspace_root", &self.workspace_root)
            .field("registry", &self.registry)
            .field("transactions", &self.history.len())
            .finish()
    }
}

fn record_failure(result: &mut FixResult, fix: &Fix, message: String) {
    result.failed_fixes.push(fix.clone());
    result.errors.push(FixFailure {
        fix_id: fix.id.clone(),
        message,
    });
    result.summary.failed += 1;
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use mender_core::{RiskLevel, Severity};
    use tempfile::tempdir;

    use super::*;
    use crate::providers::FormattingProvider;

    fn coordinator(root: &Path) -> TransactionCoordinator {
        let mut coordinator = TransactionCoordinator::new(root, root.join(".mender/backups"));
        coordinator.register_provider(Box::new(FormattingProvider));
        coordinator
    }

    #[test]
    fn issues_without_auto_fix_are_ignored() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.ts"), "let x = 1;  \n").expect("write");

        let coordinator = coordinator(temp.path());
        let issue = Issue::new("i1", "trailing-whitespace", Severity::Low, "a.ts")
            .at_line(1)
            .without_auto_fix();

        assert!(
            coordinator
                .generate_fixes(&[issue], &FixOptions::default())
                .is_empty()
        );
    }

    #[test]
    fn unreadable_issue_file_is_skipped() {
        let temp = tempdir().expect("tempdir");
        let coordinator = coordinator(temp.path());
        let issue = Issue::new("i1", "trailing-whitespace", Severity::Low, "gone.ts");

        assert!(
            coordinator
                .generate_fixes(&[issue], &FixOptions::default())
                .is_empty()
        );
    }

    #[test]
    fn invalid_fix_is_recorded_as_failed_and_not_backed_up() {
        let temp = tempdir().expect("tempdir");
        let mut coordinator = coordinator(temp.path());
        let issue = Issue::new("i1", "trailing-whitespace", Severity::Low, "missing.ts");
        let fix = Fix::new(
            "formatting",
            &issue,
            "strip",
            vec![mender_core::FileChange::replace("missing.ts", "a ", "a")],
            0.98,
            RiskLevel::Low,
        );

        let result = coordinator
            .apply_fixes(vec![fix], &FixOptions::default())
            .expect("validation failures are per fix");

        assert!(!result.success);
        assert_eq!(result.summary.failed, 1);
        assert!(result.errors[0].message.contains("missing file"));
        let transaction = coordinator
            .transaction(&result.transaction_id)
            .expect("transaction recorded");
        assert_eq!(transaction.status, TransactionStatus::Applied);
        assert!(transaction.backups.is_empty());
    }
}
