use tree_sitter::Query;

use crate::registry::LanguageConfig;

pub fn config() -> LanguageConfig {
    let ts_language = tree_sitter_python::LANGUAGE.into();
    let import_query = Query::new(&ts_language, include_str!("../queries/python_imports.scm"))
        .expect("invalid python import query");
    let declaration_query = Query::new(
        &ts_language,
        include_str!("../queries/python_declarations.scm"),
    )
    .expect("invalid python declaration query");

    LanguageConfig {
        id: "python",
        extensions: &["py", "pyi"],
        ts_language,
        import_query,
        declaration_query,
    }
}
