use tree_sitter::Query;

use crate::registry::LanguageConfig;

pub fn config() -> LanguageConfig {
    let ts_language = tree_sitter_rust::LANGUAGE.into();
    let import_query = Query::new(&ts_language, include_str!("../queries/rust_imports.scm"))
        .expect("invalid rust import query");
    let declaration_query = Query::new(
        &ts_language,
        include_str!("../queries/rust_declarations.scm"),
    )
    .expect("invalid rust declaration query");

    LanguageConfig {
        id: "rust",
        extensions: &["rs"],
        ts_language,
        import_query,
        declaration_query,
    }
}
