use mender_core::Language;
use streaming_iterator::StreamingIterator;
use thiserror::Error;
use tree_sitter::{Node, Parser, Query, QueryCursor, Tree};

use crate::registry::{LanguageConfig, LanguageRegistry, default_registry};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no grammar registered for {language} file {file_path}")]
    UnsupportedLanguage {
        language: &'static str,
        file_path: String,
    },
    #[error("failed to load {0} tree-sitter grammar")]
    Grammar(&'static str),
    #[error("tree-sitter parser produced no syntax tree for {0}")]
    NoTree(String),
}

/// A named declaration (function, class, struct, ...) located by the
/// language's declaration query.
#[derive(Debug, Clone)]
pub struct Declaration<'tree> {
    pub node: Node<'tree>,
    pub name: String,
}

/// Parses source text with the grammar matching a language/path pair.
///
/// A fresh `tree_sitter::Parser` is built per call so the parser can be shared
/// behind `&self` by stateless fix providers.
pub struct SourceParser {
    registry: LanguageRegistry,
}

impl SourceParser {
    pub fn new() -> Self {
        Self::with_registry(default_registry())
    }

    pub fn with_registry(registry: LanguageRegistry) -> Self {
        Self { registry }
    }

    pub fn parse<'a>(
        &'a self,
        language: Language,
        file_path: &str,
        source: &'a str,
    ) -> Result<ParsedSource<'a>, ParseError> {
        let config = self.registry.config_for(language, file_path).ok_or_else(|| {
            ParseError::UnsupportedLanguage {
                language: language.as_str(),
                file_path: file_path.to_owned(),
            }
        })?;

        let mut parser = Parser::new();
        parser
            .set_language(&config.ts_language)
            .map_err(|_| ParseError::Grammar(config.id))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ParseError::NoTree(file_path.to_owned()))?;

        Ok(ParsedSource {
            tree,
            source,
            config,
        })
    }
}

impl Default for SourceParser {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ParsedSource<'a> {
    tree: Tree,
    source: &'a str,
    config: &'a LanguageConfig,
}

impl<'a> ParsedSource<'a> {
    pub fn config_id(&self) -> &'static str {
        self.config.id
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    pub fn text(&self, node: Node<'_>) -> &'a str {
        self.source
            .get(node.start_byte()..node.end_byte())
            .unwrap_or_default()
    }

    /// Import/use statements in source order.
    pub fn imports(&self) -> Vec<Node<'_>> {
        let mut nodes = Vec::new();
        self.for_each_match(&self.config.import_query, |query, captures| {
            for capture in captures {
                if capture_name(query, capture.index) == Some("import") {
                    nodes.push(capture.node);
                }
            }
        });
        nodes.sort_by_key(|node| node.start_byte());
        nodes.dedup_by_key(|node| node.id());
        nodes
    }

    pub fn declarations(&self) -> Vec<Declaration<'_>> {
        let source = self.source.as_bytes();
        let mut declarations = Vec::new();
        self.for_each_match(&self.config.declaration_query, |query, captures| {
            let mut node = None;
            let mut name = None;
            for capture in captures {
                match capture_name(query, capture.index) {
                    Some("declaration") => node = Some(capture.node),
                    Some("name") => {
                        name = capture.node.utf8_text(source).ok().map(str::to_owned);
                    }
                    _ => {}
                }
            }
            if let (Some(node), Some(name)) = (node, name) {
                declarations.push(Declaration { node, name });
            }
        });
        declarations.sort_by_key(|declaration| declaration.node.start_byte());
        declarations
    }

    /// All nodes of `kind` in pre-order.
    pub fn nodes_of_kind(&self, kind: &str) -> Vec<Node<'_>> {
        let mut nodes = Vec::new();
        walk_preorder(self.tree.root_node(), |node| {
            if node.kind() == kind {
                nodes.push(node);
            }
        });
        nodes
    }

    /// First node of `kind` that starts on the 1-based `line`.
    pub fn node_on_line(&self, kind: &str, line: usize) -> Option<Node<'_>> {
        let row = line.checked_sub(1)?;
        self.nodes_of_kind(kind)
            .into_iter()
            .find(|node| node.start_position().row == row)
    }

    fn for_each_match<'t>(
        &'t self,
        query: &Query,
        mut visit: impl FnMut(&Query, &[tree_sitter::QueryCapture<'t>]),
    ) {
        let mut cursor = QueryCursor::new();
        let mut query_matches = cursor.matches(query, self.tree.root_node(), self.source.as_bytes());
        while let Some(matched) = query_matches.next() {
            visit(query, matched.captures);
        }
    }
}

/// Byte bounds of the line containing `offset`; the end excludes the newline.
pub fn line_bounds(content: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(content.len());
    let start = content[..offset].rfind('\n').map_or(0, |index| index + 1);
    let end = content[offset..]
        .find('\n')
        .map_or(content.len(), |index| offset + index);
    (start, end)
}

fn capture_name(query: &Query, index: u32) -> Option<&str> {
    query.capture_names().get(index as usize).copied()
}

fn walk_preorder<'t>(root: Node<'t>, mut visit: impl FnMut(Node<'t>)) {
    let mut cursor = root.walk();
    loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}
