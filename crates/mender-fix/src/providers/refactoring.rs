use std::collections::HashSet;

use mender_core::{Fix, Issue, RiskLevel};
use mender_parse::{ParsedSource, SourceParser};
use tree_sitter::Node;

use super::anchored_change;
use crate::error::ProviderError;
use crate::provider::{FixContext, FixProvider};
use crate::validator::is_structurally_valid;

const PREFER_CONST: &str = "prefer-const";
const NO_VAR: &str = "no-var";

/// Keyword-level declaration rewrites for TypeScript and JavaScript.
pub struct RefactoringProvider {
    parser: SourceParser,
}

impl RefactoringProvider {
    pub fn new() -> Self {
        Self {
            parser: SourceParser::new(),
        }
    }
}

impl Default for RefactoringProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FixProvider for RefactoringProvider {
    fn name(&self) -> &'static str {
        "refactoring"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &[PREFER_CONST, NO_VAR]
    }

    fn generate_fix(
        &self,
        issue: &Issue,
        context: &FixContext<'_>,
    ) -> Result<Option<Fix>, ProviderError> {
        let Some(language) = context.language.filter(|language| language.is_ecmascript()) else {
            return Ok(None);
        };
        let parsed = self
            .parser
            .parse(language, context.file_path, context.file_content)?;

        let (kind, keyword, replacement, confidence) = match issue.issue_type.as_str() {
            PREFER_CONST => ("lexical_declaration", "let", "const", 0.8),
            NO_VAR => ("variable_declaration", "var", "let", 0.75),
            _ => return Ok(None),
        };

        let eligible = |node: &Node<'_>| {
            keyword_token(*node, keyword).is_some()
                && (keyword != "let" || never_reassigned(&parsed, *node))
        };
        let declaration = match issue.line {
            Some(line) => parsed
                .node_on_line(kind, line)
                .filter(|node| eligible(node)),
            None => parsed.nodes_of_kind(kind).into_iter().find(|node| eligible(node)),
        };
        let Some(declaration) = declaration else {
            return Ok(None);
        };
        let Some(token) = keyword_token(declaration, keyword) else {
            return Ok(None);
        };

        let change = anchored_change(
            context.file_path,
            context.file_content,
            token.start_byte()..token.end_byte(),
            replacement,
        );
        Ok(Some(Fix::new(
            self.name(),
            issue,
            format!("Replace `{keyword}` with `{replacement}`"),
            vec![change],
            confidence,
            RiskLevel::Medium,
        )))
    }

    fn validate_fix(&self, fix: &Fix) -> bool {
        is_structurally_valid(fix)
            && fix
                .changes
                .iter()
                .all(|change| bracket_balance(&change.original) == bracket_balance(&change.modified))
    }
}

fn keyword_token<'tree>(declaration: Node<'tree>, keyword: &str) -> Option<Node<'tree>> {
    declaration.child(0).filter(|token| token.kind() == keyword)
}

/// True when every declarator binds a plain identifier with an initializer and
/// none of those names is assigned, compound-assigned or incremented anywhere
/// in the file.
fn never_reassigned(parsed: &ParsedSource<'_>, declaration: Node<'_>) -> bool {
    let mut names = HashSet::new();
    let mut cursor = declaration.walk();
    for declarator in declaration.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name) = declarator.child_by_field_name("name") else {
            return false;
        };
        if name.kind() != "identifier" || declarator.child_by_field_name("value").is_none() {
            return false;
        }
        names.insert(parsed.text(name));
    }
    if names.is_empty() {
        return false;
    }

    let targets = [
        ("assignment_expression", "left"),
        ("augmented_assignment_expression", "left"),
        ("update_expression", "argument"),
    ];
    !targets.iter().any(|(kind, field)| {
        parsed.nodes_of_kind(kind).into_iter().any(|node| {
            node.child_by_field_name(field)
                .is_some_and(|target| target.kind() == "identifier" && names.contains(parsed.text(target)))
        })
    })
}

fn bracket_balance(text: &str) -> [i64; 3] {
    let mut balance = [0i64; 3];
    for ch in text.chars() {
        match ch {
            '(' => balance[0] += 1,
            ')' => balance[0] -= 1,
            '{' => balance[1] += 1,
            '}' => balance[1] -= 1,
            '[' => balance[2] += 1,
            ']' => balance[2] -= 1,
            _ => {}
        }
    }
    balance
}
