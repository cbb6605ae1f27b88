use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

pub type IssueId = String;
pub type FixId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    TypeScript,
    Tsx,
    JavaScript,
    Jsx,
    Python,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::JavaScript => "javascript",
            Self::Jsx => "jsx",
            Self::Python => "python",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "rs" => Some(Self::Rust),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            "jsx" => Some(Self::Jsx),
            "py" | "pyi" => Some(Self::Python),
            _ => None,
        }
    }

    pub fn for_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_string_lossy();
        Self::from_extension(&ext)
    }

    pub fn is_ecmascript(self) -> bool {
        matches!(
            self,
            Self::TypeScript | Self::Tsx | Self::JavaScript | Self::Jsx
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!(
                "invalid severity '{other}', expected one of: low, medium, high, critical"
            )),
        }
    }
}

/// Ordered so that `Low < Medium < High`; risk ceilings compare with `<=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "invalid risk level '{other}', expected one of: low, medium, high"
            )),
        }
    }
}

/// A located finding produced by an analyzer. Field aliases accept the
/// camelCase shape emitted by JavaScript tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    #[serde(alias = "file", alias = "filePath")]
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "autoFixAvailable")]
    pub auto_fix_available: bool,
}

impl Issue {
    pub fn new(
        id: impl Into<String>,
        issue_type: impl Into<String>,
        severity: Severity,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            issue_type: issue_type.into(),
            severity,
            file_path: normalize_path(&file_path.into()),
            line: None,
            description: String::new(),
            auto_fix_available: true,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn without_auto_fix(mut self) -> Self {
        self.auto_fix_available = false;
        self
    }
}

/// One expected-text to replacement-text edit within a single file.
///
/// An empty `original` replaces the whole file with `modified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub file_path: String,
    pub original: String,
    pub modified: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_column: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<usize>,
}

impl FileChange {
    pub fn replace(
        file_path: impl Into<String>,
        original: impl Into<String>,
        modified: impl Into<String>,
    ) -> Self {
        Self {
            file_path: normalize_path(&file_path.into()),
            original: original.into(),
            modified: modified.into(),
            start_line: None,
            end_line: None,
            start_column: None,
            end_column: None,
        }
    }

    pub fn whole_file(file_path: impl Into<String>, modified: impl Into<String>) -> Self {
        Self::replace(file_path, String::new(), modified)
    }

    pub fn with_lines(mut self, start_line: usize, end_line: usize) -> Self {
        self.start_line = Some(start_line);
        self.end_line = Some(end_line);
        self
    }

    pub fn is_whole_file(&self) -> bool {
        self.original.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub id: FixId,
    pub issue_id: IssueId,
    pub description: String,
    pub changes: Vec<FileChange>,
    pub confidence: f32,
    pub risk: RiskLevel,
    pub provider: String,
}

impl Fix {
    /// Builds a fix whose id is derived from its provider, issue and edits, so
    /// regenerating the same remediation yields the same id.
    pub fn new(
        provider: &str,
        issue: &Issue,
        description: impl Into<String>,
        changes: Vec<FileChange>,
        confidence: f32,
        risk: RiskLevel,
    ) -> Self {
        Self {
            id: stable_fix_id(provider, &issue.id, &changes),
            issue_id: issue.id.clone(),
            description: description.into(),
            changes,
            confidence,
            risk,
            provider: provider.to_owned(),
        }
    }

    /// Distinct file paths referenced by the changes, in first-seen order.
    pub fn touched_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for change in &self.changes {
            if !files.contains(&change.file_path.as_str()) {
                files.push(change.file_path.as_str());
            }
        }
        files
    }
}

pub fn stable_fix_id(provider: &str, issue_id: &str, changes: &[FileChange]) -> FixId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(provider.as_bytes());
    hasher.update(b"\n");
    hasher.update(issue_id.as_bytes());
    for change in changes {
        hasher.update(b"\n");
        hasher.update(normalize_path(&change.file_path).as_bytes());
        hasher.update(b"\0");
        hasher.update(change.original.as_bytes());
        hasher.update(b"\0");
        hasher.update(change.modified.as_bytes());
    }
    let hex = hasher.finalize().to_hex();
    format!("fix_{}", &hex.as_str()[..16])
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// True for non-empty relative paths that never climb above their base
/// directory.
pub fn is_workspace_relative(path: &str) -> bool {
    let normalized = normalize_path(path);
    let mut components = Path::new(&normalized).components().peekable();
    components.peek().is_some()
        && components.all(|component| {
            matches!(component, Component::Normal(_) | Component::CurDir)
        })
}
