use std::collections::HashMap;
use std::path::Path;

use mender_core::Language;
use tree_sitter::Query;

use crate::languages;

pub struct LanguageConfig {
    pub id: &'static str,
    pub extensions: &'static [&'static str],
    pub ts_language: tree_sitter::Language,
    pub import_query: Query,
    pub declaration_query: Query,
}

pub struct LanguageRegistry {
    configs: Vec<LanguageConfig>,
    extension_index: HashMap<String, usize>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self {
            configs: Vec::new(),
            extension_index: HashMap::new(),
        }
    }

    pub fn register(&mut self, config: LanguageConfig) {
        let index = self.configs.len();
        for ext in config.extensions {
            let normalized = normalize_extension(ext);
            self.extension_index.entry(normalized).or_insert(index);
        }
        self.configs.push(config);
    }

    pub fn get_by_extension(&self, extension: &str) -> Option<&LanguageConfig> {
        let normalized = normalize_extension(extension);
        let index = *self.extension_index.get(&normalized)?;
        self.configs.get(index)
    }

    pub fn get_by_path(&self, path: &Path) -> Option<&LanguageConfig> {
        let ext = path.extension()?.to_string_lossy();
        self.get_by_extension(&ext)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&LanguageConfig> {
        self.configs.iter().find(|config| config.id == id)
    }

    /// Prefers the grammar implied by the file extension and falls back to the
    /// declared language when the path carries no recognizable extension.
    pub fn config_for(&self, language: Language, file_path: &str) -> Option<&LanguageConfig> {
        let by_path = self.get_by_path(Path::new(file_path));
        if by_path.is_some() {
            return by_path;
        }

        let fallback_id = match language {
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::Tsx | Language::JavaScript | Language::Jsx => "tsx_js",
            Language::Python => "python",
        };
        self.get_by_id(fallback_id)
    }

    pub fn configs(&self) -> &[LanguageConfig] {
        &self.configs
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        default_registry()
    }
}

pub fn default_registry() -> LanguageRegistry {
    let mut registry = LanguageRegistry::new();
    registry.register(languages::python::config());
    registry.register(languages::rust::config());
    registry.register(languages::typescript::config());
    registry.register(languages::typescript::tsx_js_config());
    registry
}

fn normalize_extension(extension: &str) -> String {
    extension
        .trim_start_matches('.')
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_resolve_to_grammar_configs() {
        let registry = default_registry();

        assert_eq!(registry.get_by_extension(".RS").map(|c| c.id), Some("rust"));
        assert_eq!(registry.get_by_extension("ts").map(|c| c.id), Some("typescript"));
        assert_eq!(registry.get_by_extension("jsx").map(|c| c.id), Some("tsx_js"));
        assert_eq!(registry.get_by_extension("py").map(|c| c.id), Some("python"));
        assert!(registry.get_by_extension("md").is_none());
    }

    #[test]
    fn config_for_falls_back_to_declared_language() {
        let registry = default_registry();

        assert_eq!(
            registry.config_for(Language::Python, "scripts/run").map(|c| c.id),
            Some("python")
        );
        assert_eq!(
            registry.config_for(Language::Rust, "src/app.ts").map(|c| c.id),
            Some("typescript")
        );
    }
}
