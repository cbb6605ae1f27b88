mod languages;
mod parser;
mod registry;

pub use parser::{Declaration, ParseError, ParsedSource, SourceParser, line_bounds};
pub use registry::{LanguageConfig, LanguageRegistry, default_registry};
