use mender_config::FixConfig;
use mender_core::{Fix, RiskLevel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOptions {
    pub dry_run: bool,
    pub interactive: bool,
    /// Provider names allowed to contribute fixes; empty allows all.
    pub categories: Vec<String>,
    pub max_risk: RiskLevel,
    pub min_confidence: f32,
    pub create_backup: bool,
    pub validate_after_fix: bool,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self::from(&FixConfig::default())
    }
}

impl From<&FixConfig> for FixOptions {
    fn from(config: &FixConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            interactive: config.interactive,
            categories: config.categories.clone(),
            max_risk: config.max_risk,
            min_confidence: config.min_confidence,
            create_backup: config.create_backup,
            validate_after_fix: config.validate_after_fix,
        }
    }
}

pub fn should_apply_fix(fix: &Fix, options: &FixOptions) -> bool {
    if fix.risk > options.max_risk {
        return false;
    }
    if fix.confidence < options.min_confidence {
        return false;
    }
    options.categories.is_empty() || options.categories.iter().any(|name| *name == fix.provider)
}
