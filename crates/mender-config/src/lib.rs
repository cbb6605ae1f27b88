use std::fs;
use std::path::{Path, PathBuf};

use mender_core::RiskLevel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MENDER_DIR_NAME: &str = ".mender";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_BACKUP_DIR: &str = ".mender/backups";
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.7;
pub const DEFAULT_DOC_PLACEHOLDER: &str = "TODO: document";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MenderConfig {
    #[serde(default)]
    pub fix: FixConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default = "default_max_risk")]
    pub max_risk: RiskLevel,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_true")]
    pub create_backup: bool,
    #[serde(default = "default_true")]
    pub validate_after_fix: bool,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            interactive: false,
            categories: Vec::new(),
            max_risk: default_max_risk(),
            min_confidence: default_min_confidence(),
            create_backup: true,
            validate_after_fix: true,
            backup_dir: default_backup_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default)]
    pub documentation: DocumentationConfig,
}

impl ProvidersConfig {
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|disabled| disabled == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentationConfig {
    #[serde(default = "default_doc_placeholder")]
    pub placeholder: String,
}

impl Default for DocumentationConfig {
    fn default() -> Self {
        Self {
            placeholder: default_doc_placeholder(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn mender_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(MENDER_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    mender_dir(workspace_root).join(CONFIG_FILE_NAME)
}

/// Resolves the configured backup directory against the workspace root.
pub fn backup_dir(workspace_root: impl AsRef<Path>, config: &FixConfig) -> PathBuf {
    let configured = Path::new(&config.backup_dir);
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        workspace_root.as_ref().join(configured)
    }
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<MenderConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(MenderConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: MenderConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<MenderConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(mender_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = MenderConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &MenderConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    let confidence = config.fix.min_confidence;
    if !(0.0..=1.0).contains(&confidence) {
        warnings.push(ConfigWarning {
            code: "fix.min_confidence_out_of_range",
            message: format!(
                "min_confidence {confidence} is outside 0.0..=1.0; every fix will be {}",
                if confidence > 1.0 { "rejected" } else { "accepted" }
            ),
        });
    }

    if !config.fix.create_backup && !config.fix.dry_run {
        warnings.push(ConfigWarning {
            code: "fix.backups_disabled",
            message: "create_backup is false; failed transactions cannot be rolled back"
                .to_owned(),
        });
    }

    for category in &config.fix.categories {
        if config.providers.is_disabled(category) {
            warnings.push(ConfigWarning {
                code: "fix.category_disabled",
                message: format!(
                    "category '{category}' is allowed but its provider is disabled"
                ),
            });
        }
    }

    warnings
}

fn default_true() -> bool {
    true
}

fn default_max_risk() -> RiskLevel {
    RiskLevel::Medium
}

fn default_min_confidence() -> f32 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_backup_dir() -> String {
    DEFAULT_BACKUP_DIR.to_owned()
}

fn default_doc_placeholder() -> String {
    DEFAULT_DOC_PLACEHOLDER.to_owned()
}

fn normalize_names(input: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(input.len());
    for name in input {
        let name = name.trim().to_owned();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn normalize_config(mut config: MenderConfig) -> MenderConfig {
    config.fix.categories = normalize_names(std::mem::take(&mut config.fix.categories));
    config.providers.disabled = normalize_names(std::mem::take(&mut config.providers.disabled));

    let backup_dir = config.fix.backup_dir.trim();
    if backup_dir.is_empty() {
        config.fix.backup_dir = default_backup_dir();
    } else {
        config.fix.backup_dir = backup_dir.to_owned();
    }

    if config.providers.documentation.placeholder.trim().is_empty() {
        config.providers.documentation.placeholder = default_doc_placeholder();
    }

    config
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn ensure_workspace_config_creates_default_file() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();

        let config = ensure_workspace_config(workspace).expect("ensure config");

        assert_eq!(config.fix.max_risk, RiskLevel::Medium);
        assert_eq!(config.fix.min_confidence, DEFAULT_MIN_CONFIDENCE);
        assert!(config.fix.create_backup);
        assert!(config_path(workspace).exists());

        let content = fs::read_to_string(config_path(workspace)).expect("read config file");
        assert!(content.contains("[fix]"));
        assert!(content.contains("max_risk = \"medium\""));
    }

    #[test]
    fn load_workspace_config_parses_fix_values() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();
        fs::create_dir_all(mender_dir(workspace)).expect("create .mender");

        let raw = r#"
[fix]
dry_run = true
categories = [" formatting ", "imports", "formatting", ""]
max_risk = "high"
min_confidence = 0.9
backup_dir = "  "

[providers]
disabled = ["refactoring"]

[providers.documentation]
placeholder = "Describe me"
"#;
        fs::write(config_path(workspace), raw).expect("write config");

        let config = load_workspace_config(workspace).expect("load config");

        assert!(config.fix.dry_run);
        assert_eq!(config.fix.categories, vec!["formatting", "imports"]);
        assert_eq!(config.fix.max_risk, RiskLevel::High);
        assert_eq!(config.fix.min_confidence, 0.9);
        assert_eq!(config.fix.backup_dir, DEFAULT_BACKUP_DIR);
        assert!(config.fix.validate_after_fix);
        assert!(config.providers.is_disabled("refactoring"));
        assert_eq!(config.providers.documentation.placeholder, "Describe me");
    }

    #[test]
    fn missing_config_yields_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_workspace_config(temp.path()).expect("load config");
        assert_eq!(config, MenderConfig::default());
        assert!(!config_path(temp.path()).exists());
    }

    #[test]
    fn backup_dir_resolves_relative_to_workspace() {
        let mut config = FixConfig::default();
        assert_eq!(
            backup_dir("/work", &config),
            PathBuf::from("/work/.mender/backups")
        );

        config.backup_dir = "/var/tmp/mender".to_owned();
        assert_eq!(
            backup_dir("/work", &config),
            PathBuf::from("/var/tmp/mender")
        );
    }

    #[test]
    fn validate_config_reports_suspicious_settings() {
        let mut config = MenderConfig::default();
        assert!(validate_config(&config).is_empty());

        config.fix.min_confidence = 1.5;
        config.fix.create_backup = false;
        config.fix.categories = vec!["imports".to_owned()];
        config.providers.disabled = vec!["imports".to_owned()];

        let codes = validate_config(&config)
            .into_iter()
            .map(|warning| warning.code)
            .collect::<Vec<_>>();
        assert_eq!(
            codes,
            vec![
                "fix.min_confidence_out_of_range",
                "fix.backups_disabled",
                "fix.category_disabled",
            ]
        );
    }
}
