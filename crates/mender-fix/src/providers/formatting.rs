use std::ops::Range;

use mender_core::{FileChange, Fix, Issue, RiskLevel};

use super::{anchored_change, leading_whitespace, line_range};
use crate::error::ProviderError;
use crate::provider::{FixContext, FixProvider};
use crate::validator::is_structurally_valid;

const TRAILING_WHITESPACE: &str = "trailing-whitespace";
const MISSING_FINAL_NEWLINE: &str = "missing-final-newline";
const MIXED_INDENTATION: &str = "mixed-indentation";

const INDENT: &str = "    ";

/// Whitespace-only edits. Works on any text file, no parsing involved.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormattingProvider;

impl FixProvider for FormattingProvider {
    fn name(&self) -> &'static str {
        "formatting"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &[TRAILING_WHITESPACE, MISSING_FINAL_NEWLINE, MIXED_INDENTATION]
    }

    fn generate_fix(
        &self,
        issue: &Issue,
        context: &FixContext<'_>,
    ) -> Result<Option<Fix>, ProviderError> {
        let content = context.file_content;
        let fix = match issue.issue_type.as_str() {
            TRAILING_WHITESPACE => {
                let edits = line_edits(content, issue.line, trailing_whitespace);
                build(context, issue, "Remove trailing whitespace", edits, 0.98)
            }
            MISSING_FINAL_NEWLINE => {
                if content.is_empty() || content.ends_with('\n') {
                    return Ok(None);
                }
                let end = content.len();
                let change = anchored_change(context.file_path, content, end..end, "\n");
                Some(Fix::new(
                    self.name(),
                    issue,
                    "Add missing final newline",
                    vec![change],
                    0.99,
                    RiskLevel::Low,
                ))
            }
            MIXED_INDENTATION => {
                let edits = line_edits(content, issue.line, tab_indentation);
                build(context, issue, "Convert tab indentation to spaces", edits, 0.85)
            }
            _ => None,
        };
        Ok(fix)
    }

    fn validate_fix(&self, fix: &Fix) -> bool {
        is_structurally_valid(fix)
            && fix.changes.iter().all(|change| {
                change
                    .original
                    .split_whitespace()
                    .eq(change.modified.split_whitespace())
            })
    }
}

struct LineEdit {
    range: Range<usize>,
    replacement: String,
}

/// Edits for one line when `line` is set, otherwise for every line that needs
/// one. Whole-file edits are emitted bottom-up so each anchor stays valid
/// while earlier changes in the list are applied.
fn line_edits(
    content: &str,
    line: Option<usize>,
    edit_line: fn(&str, usize) -> Option<LineEdit>,
) -> Vec<LineEdit> {
    if let Some(line) = line {
        return line_range(content, line)
            .and_then(|range| edit_line(&content[range.clone()], range.start))
            .into_iter()
            .collect();
    }

    let mut edits = Vec::new();
    let mut offset = 0;
    for text in content.split('\n') {
        if let Some(edit) = edit_line(text, offset) {
            edits.push(edit);
        }
        offset += text.len() + 1;
    }
    edits.reverse();
    edits
}

fn trailing_whitespace(line: &str, line_start: usize) -> Option<LineEdit> {
    let body = line.strip_suffix('\r').unwrap_or(line);
    let trimmed = body.trim_end_matches([' ', '\t']);
    (trimmed.len() < body.len()).then(|| LineEdit {
        range: line_start + trimmed.len()..line_start + body.len(),
        replacement: String::new(),
    })
}

fn tab_indentation(line: &str, line_start: usize) -> Option<LineEdit> {
    let indent = leading_whitespace(line);
    indent.contains('\t').then(|| LineEdit {
        range: line_start..line_start + indent.len(),
        replacement: indent.replace('\t', INDENT),
    })
}

fn build(
    context: &FixContext<'_>,
    issue: &Issue,
    description: &str,
    edits: Vec<LineEdit>,
    confidence: f32,
) -> Option<Fix> {
    if edits.is_empty() {
        return None;
    }
    let changes: Vec<FileChange> = edits
        .into_iter()
        .map(|edit| {
            anchored_change(
                context.file_path,
                context.file_content,
                edit.range,
                &edit.replacement,
            )
        })
        .collect();
    Some(Fix::new(
        "formatting",
        issue,
        description,
        changes,
        confidence,
        RiskLevel::Low,
    ))
}
