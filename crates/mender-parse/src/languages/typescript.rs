use tree_sitter::Query;

use crate::registry::LanguageConfig;

pub fn config() -> LanguageConfig {
    build("typescript", &["ts", "mts", "cts"], tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
}

/// The TSX grammar is a superset of JavaScript, so plain `.js` files share it.
pub fn tsx_js_config() -> LanguageConfig {
    build(
        "tsx_js",
        &["tsx", "js", "jsx", "mjs", "cjs"],
        tree_sitter_typescript::LANGUAGE_TSX.into(),
    )
}

fn build(
    id: &'static str,
    extensions: &'static [&'static str],
    ts_language: tree_sitter::Language,
) -> LanguageConfig {
    let import_query = Query::new(
        &ts_language,
        include_str!("../queries/typescript_imports.scm"),
    )
    .expect("invalid typescript import query");
    let declaration_query = Query::new(
        &ts_language,
        include_str!("../queries/typescript_declarations.scm"),
    )
    .expect("invalid typescript declaration query");

    LanguageConfig {
        id,
        extensions,
        ts_language,
        import_query,
        declaration_query,
    }
}
