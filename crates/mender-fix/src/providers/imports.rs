use std::collections::HashSet;

use mender_core::{Fix, Issue, RiskLevel};
use mender_parse::SourceParser;
use tracing::debug;

use super::{anchored_change, deletion_range};
use crate::error::ProviderError;
use crate::provider::{FixContext, FixProvider};

const UNUSED_IMPORT: &str = "unused-import";
const DUPLICATE_IMPORT: &str = "duplicate-import";

/// Deletes unused or repeated import statements located through the syntax tree.
pub struct ImportsProvider {
    parser: SourceParser,
}

impl ImportsProvider {
    pub fn new() -> Self {
        Self {
            parser: SourceParser::new(),
        }
    }

    fn unused_import(
        &self,
        issue: &Issue,
        context: &FixContext<'_>,
    ) -> Result<Option<Fix>, ProviderError> {
        let Some(language) = context.language else {
            return Ok(None);
        };
        let parsed = self
            .parser
            .parse(language, context.file_path, context.file_content)?;
        let imports = parsed.imports();
        let symbol = quoted_symbol(&issue.description);

        let target = match (issue.line, symbol) {
            (Some(line), _) => imports
                .iter()
                .find(|node| node.start_position().row + 1 == line),
            (None, Some(symbol)) => imports
                .iter()
                .find(|node| contains_word(parsed.text(**node), symbol)),
            (None, None) => None,
        };
        let Some(node) = target else {
            return Ok(None);
        };

        let text = parsed.text(*node);
        if symbol.is_some_and(|symbol| imports_several_names(text) && contains_word(text, symbol)) {
            debug!(
                issue_id = %issue.id,
                "import statement names several symbols; leaving it alone"
            );
            return Ok(None);
        }

        let range = deletion_range(context.file_content, node.start_byte()..node.end_byte());
        let change = anchored_change(context.file_path, context.file_content, range, "");
        Ok(Some(Fix::new(
            self.name(),
            issue,
            format!("Remove unused import `{}`", text.trim()),
            vec![change],
            0.8,
            RiskLevel::Medium,
        )))
    }

    fn duplicate_import(
        &self,
        issue: &Issue,
        context: &FixContext<'_>,
    ) -> Result<Option<Fix>, ProviderError> {
        let Some(language) = context.language else {
            return Ok(None);
        };
        let parsed = self
            .parser
            .parse(language, context.file_path, context.file_content)?;

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for node in parsed.imports() {
            let key = collapse_whitespace(parsed.text(node));
            if !seen.insert(key) {
                duplicates.push(node);
            }
        }
        if let Some(line) = issue.line {
            duplicates.retain(|node| node.start_position().row + 1 == line);
        }
        if duplicates.is_empty() {
            return Ok(None);
        }

        let changes = duplicates
            .iter()
            .rev()
            .map(|node| {
                let range =
                    deletion_range(context.file_content, node.start_byte()..node.end_byte());
                anchored_change(context.file_path, context.file_content, range, "")
            })
            .collect();
        Ok(Some(Fix::new(
            self.name(),
            issue,
            format!("Remove {} duplicate import(s)", duplicates.len()),
            changes,
            0.95,
            RiskLevel::Low,
        )))
    }
}

impl Default for ImportsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FixProvider for ImportsProvider {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &[UNUSED_IMPORT, DUPLICATE_IMPORT]
    }

    fn generate_fix(
        &self,
        issue: &Issue,
        context: &FixContext<'_>,
    ) -> Result<Option<Fix>, ProviderError> {
        match issue.issue_type.as_str() {
            UNUSED_IMPORT => self.unused_import(issue, context),
            DUPLICATE_IMPORT => self.duplicate_import(issue, context),
            _ => Ok(None),
        }
    }
}

/// First name quoted with backticks or quotes in an issue description.
fn quoted_symbol(description: &str) -> Option<&str> {
    for quote in ['`', '\'', '"'] {
        let mut parts = description.split(quote);
        if let (Some(_), Some(symbol), Some(_)) = (parts.next(), parts.next(), parts.next())
            && !symbol.trim().is_empty()
        {
            return Some(symbol.trim());
        }
    }
    None
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '$'))
        .any(|token| token == word)
}

fn imports_several_names(text: &str) -> bool {
    text.contains(',')
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use mender_config::ProvidersConfig;
    use mender_core::{Language, Severity};

    use super::*;
    use crate::applier::substitute;

    fn run(issue: &Issue, content: &str) -> Option<Fix> {
        let config = ProvidersConfig::default();
        let context = FixContext {
            file_content: content,
            file_path: &issue.file_path,
            language: Language::for_path(&issue.file_path),
            issue,
            config: &config,
        };
        ImportsProvider::new()
            .generate_fix(issue, &context)
            .expect("generate")
    }

    fn apply_all(content: &str, fix: &Fix) -> String {
        fix.changes.iter().fold(content.to_owned(), |current, change| {
            substitute(&current, change, None).expect("change applies")
        })
    }

    #[test]
    fn removes_unused_import_on_issue_line() {
        let content = "import { a } from './a';\nimport { b } from './b';\n\nconsole.log(b);\n";
        let issue = Issue::new("i1", UNUSED_IMPORT, Severity::Low, "src/main.ts").at_line(1);
        let fix = run(&issue, content).expect("fix");

        assert_eq!(fix.provider, "imports");
        assert_eq!(fix.risk, RiskLevel::Medium);
        assert_eq!(
            apply_all(content, &fix),
            "import { b } from './b';\n\nconsole.log(b);\n"
        );
    }

    #[test]
    fn finds_unused_rust_use_by_symbol() {
        let content = "use std::fmt;\nuse std::io;\n\nfn main() { io::stdout(); }\n";
        let issue = Issue::new("i1", UNUSED_IMPORT, Severity::Low, "src/main.rs")
            .with_description("unused import `fmt`");
        let fix = run(&issue, content).expect("fix");

        assert_eq!(
            apply_all(content, &fix),
            "use std::io;\n\nfn main() { io::stdout(); }\n"
        );
    }

    #[test]
    fn leaves_multi_name_imports_alone() {
        let content = "from os import path, sep\n\nprint(sep)\n";
        let issue = Issue::new("i1", UNUSED_IMPORT, Severity::Low, "a.py")
            .with_description("'path' imported but unused");
        assert!(run(&issue, content).is_none());
    }

    #[test]
    fn unsupported_language_yields_no_fix() {
        let issue = Issue::new("i1", UNUSED_IMPORT, Severity::Low, "notes.txt").at_line(1);
        assert!(run(&issue, "import x\n").is_none());
    }

    #[test]
    fn removes_every_later_duplicate() {
        let content = "import os\nimport sys\nimport os\nimport  os\n\nprint(os, sys)\n";
        let issue = Issue::new("i1", DUPLICATE_IMPORT, Severity::Low, "a.py");
        let fix = run(&issue, content).expect("fix");

        assert_eq!(fix.changes.len(), 2);
        assert_eq!(fix.confidence, 0.95);
        assert_eq!(apply_all(content, &fix), "import os\nimport sys\n\nprint(os, sys)\n");
    }

    #[test]
    fn duplicate_on_line_limits_to_that_statement() {
        let content = "import os\nimport os\nimport os\n";
        let issue = Issue::new("i1", DUPLICATE_IMPORT, Severity::Low, "a.py").at_line(2);
        let fix = run(&issue, content).expect("fix");

        assert_eq!(fix.changes.len(), 1);
        assert_eq!(apply_all(content, &fix), "import os\nimport os\n");
    }

    #[test]
    fn quoted_symbol_reads_backticks_and_quotes() {
        assert_eq!(quoted_symbol("unused import `fmt`"), Some("fmt"));
        assert_eq!(quoted_symbol("'path' imported but unused"), Some("path"));
        assert_eq!(quoted_symbol("no symbol here"), None);
    }
}
