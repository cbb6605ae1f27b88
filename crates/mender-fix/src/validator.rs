use std::path::PathBuf;

use mender_core::{Fix, is_workspace_relative};

use crate::error::ValidationError;
use crate::provider::FixProvider;

/// Structural check shared by every provider: at least one change, and every
/// change names a file and actually alters text.
pub fn is_structurally_valid(fix: &Fix) -> bool {
    !fix.changes.is_empty()
        && fix
            .changes
            .iter()
            .all(|change| !change.file_path.trim().is_empty() && change.original != change.modified)
}

/// Checks a generated fix before it is scheduled.
#[derive(Debug, Clone)]
pub struct FixValidator {
    workspace_root: PathBuf,
}

impl FixValidator {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    /// Reports the first problem found; the provider's own check runs last.
    pub fn validate(
        &self,
        fix: &Fix,
        provider: Option<&dyn FixProvider>,
    ) -> Result<(), ValidationError> {
        if fix.changes.is_empty() {
            return Err(ValidationError::NoChanges {
                fix_id: fix.id.clone(),
            });
        }
        if !(0.0..=1.0).contains(&fix.confidence) {
            return Err(ValidationError::InvalidConfidence {
                fix_id: fix.id.clone(),
                confidence: fix.confidence,
            });
        }

        for (index, change) in fix.changes.iter().enumerate() {
            if change.file_path.trim().is_empty() {
                return Err(ValidationError::EmptyPath {
                    fix_id: fix.id.clone(),
                    index,
                });
            }
            if !is_workspace_relative(&change.file_path) {
                return Err(ValidationError::OutsideWorkspace {
                    fix_id: fix.id.clone(),
                    index,
                    path: change.file_path.clone(),
                });
            }
            if !self.workspace_root.join(&change.file_path).is_file() {
                return Err(ValidationError::MissingFile {
                    fix_id: fix.id.clone(),
                    index,
                    path: change.file_path.clone(),
                });
            }
            if change.original == change.modified {
                return Err(ValidationError::NoOp {
                    fix_id: fix.id.clone(),
                    index,
                    path: change.file_path.clone(),
                });
            }
        }

        if let Some(provider) = provider
            && !provider.validate_fix(fix)
        {
            return Err(ValidationError::Rejected {
                fix_id: fix.id.clone(),
                provider: provider.name().to_owned(),
            });
        }
        Ok(())
    }
}
