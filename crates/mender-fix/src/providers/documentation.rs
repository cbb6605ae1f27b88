use mender_core::{Fix, Issue, Language, RiskLevel};
use mender_parse::{Declaration, ParsedSource, SourceParser, line_bounds};
use tree_sitter::Node;

use super::{anchored_change, leading_whitespace};
use crate::error::ProviderError;
use crate::provider::{FixContext, FixProvider};

/// Inserts a doc comment stub above (or, for Python, inside) an undocumented
/// declaration.
pub struct DocumentationProvider {
    parser: SourceParser,
}

impl DocumentationProvider {
    pub fn new() -> Self {
        Self {
            parser: SourceParser::new(),
        }
    }
}

impl Default for DocumentationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FixProvider for DocumentationProvider {
    fn name(&self) -> &'static str {
        "documentation"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["missing-docs", "missing-documentation"]
    }

    fn generate_fix(
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
        let declarations = parsed.declarations();
        let placeholder = context.config.documentation.placeholder.as_str();

        let candidate = match issue.line {
            Some(line) => declarations
                .iter()
                .find(|declaration| declaration.node.start_position().row + 1 >= line),
            None => declarations
                .iter()
                .find(|declaration| stub_for(language, &parsed, declaration, placeholder).is_some()),
        };
        let Some(declaration) = candidate else {
            return Ok(None);
        };
        let Some((offset, stub)) = stub_for(language, &parsed, declaration, placeholder) else {
            return Ok(None);
        };

        let change = anchored_change(context.file_path, context.file_content, offset..offset, &stub);
        Ok(Some(Fix::new(
            self.name(),
            issue,
            format!("Add documentation stub for `{}`", declaration.name),
            vec![change],
            0.75,
            RiskLevel::Low,
        )))
    }
}

/// Insertion offset and text for an undocumented declaration, `None` when it
/// already carries documentation or has no room for a stub.
fn stub_for(
    language: Language,
    parsed: &ParsedSource<'_>,
    declaration: &Declaration<'_>,
    placeholder: &str,
) -> Option<(usize, String)> {
    let source = parsed.source();
    match language {
        Language::Python => python_docstring(parsed, declaration.node, placeholder),
        Language::Rust => {
            let (start, _) = line_bounds(source, declaration.node.start_byte());
            if has_doc_comment(&source[..start]) {
                return None;
            }
            let indent = leading_whitespace(&source[start..]);
            Some((start, format!("{indent}/// {placeholder}\n")))
        }
        Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => {
            let node = declaration
                .node
                .parent()
                .filter(|parent| parent.kind() == "export_statement")
                .unwrap_or(declaration.node);
            let (start, _) = line_bounds(source, node.start_byte());
            if has_doc_comment(&source[..start]) {
                return None;
            }
            let indent = leading_whitespace(&source[start..]);
            Some((
                start,
                format!("{indent}/**\n{indent} * {placeholder}\n{indent} */\n"),
            ))
        }
    }
}

fn python_docstring(
    parsed: &ParsedSource<'_>,
    node: Node<'_>,
    placeholder: &str,
) -> Option<(usize, String)> {
    let body = node.child_by_field_name("body")?;
    if body.start_position().row == node.start_position().row {
        return None;
    }
    let first = body.named_child(0)?;
    if first.kind() == "expression_statement"
        && first
            .named_child(0)
            .is_some_and(|expression| expression.kind() == "string")
    {
        return None;
    }

    let source = parsed.source();
    let (start, _) = line_bounds(source, first.start_byte());
    let indent = leading_whitespace(&source[start..]);
    Some((start, format!("{indent}\"\"\"{placeholder}\"\"\"\n")))
}

/// Looks at the lines above a declaration, skipping attributes and
/// decorators, for an existing doc comment.
fn has_doc_comment(before: &str) -> bool {
    for line in before.lines().rev() {
        let line = line.trim();
        if line.starts_with("#[") && !line.starts_with("#[doc") || line.starts_with('@') {
            continue;
        }
        return line.starts_with("///")
            || line.starts_with("//!")
            || line.starts_with("#[doc")
            || line.ends_with("*/");
    }
    false
}
