//! Language parser registry.
//!
//! Each parser turns `(code, path)` into the shared structural contract:
//! a flat `functions` list (methods included, linked to their class via
//! `parent_class`), nested `classes` with full method records, and a
//! deduplicated `imports` list. Adding a language means implementing
//! [`LanguageParser`] and calling [`ParserRegistry::register`] at startup.

mod generic;
mod python;

use std::collections::HashMap;
use std::sync::Arc;

pub use generic::TreeSitterParser;
pub use python::PythonParser;

use crate::models::ParsedSource;

pub trait LanguageParser: Send + Sync {
    fn parse(&self, code: &str, path: &str) -> ParsedSource;
}

pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn LanguageParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registry with every built-in parser wired up.
    pub fn with_default_parsers() -> Self {
        let mut registry = Self::new();
        registry.register(&["python"], Arc::new(PythonParser));
        registry.register(
            &[
                "javascript",
                "jsx",
                "typescript",
                "tsx",
                "go",
                "java",
                "rust",
                "c",
                "cpp",
                "php",
            ],
            Arc::new(TreeSitterParser),
        );
        registry
    }

    pub fn register(&mut self, languages: &[&str], parser: Arc<dyn LanguageParser>) {
        for language in languages {
            self.parsers
                .insert(language.to_lowercase(), Arc::clone(&parser));
        }
    }

    pub fn is_supported(&self, language: &str) -> bool {
        self.parsers.contains_key(&language.to_lowercase())
    }

    pub fn supported_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.parsers.keys().cloned().collect();
        languages.sort();
        languages
    }

    /// Parse `code` with the parser registered for `language`. Returns
    /// `None` for unregistered languages; such files are stored unparsed.
    pub fn parse(&self, code: &str, path: &str, language: &str) -> Option<ParsedSource> {
        self.parsers
            .get(&language.to_lowercase())
            .map(|parser| parser.parse(code, path))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_default_parsers()
    }
}

pub(crate) fn node_text(node: tree_sitter::Node<'_>, code: &str) -> String {
    node.utf8_text(code.as_bytes()).unwrap_or("").to_string()
}

/// Innermost class (smallest span) whose line range contains `line`.
pub(crate) fn enclosing_class(
    classes: &[crate::models::ClassRecord],
    line: u32,
) -> Option<&crate::models::ClassRecord> {
    classes
        .iter()
        .filter(|c| c.line_start <= line && line <= c.line_end)
        .min_by_key(|c| c.line_end - c.line_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_dispatches_by_language() {
        let registry = ParserRegistry::with_default_parsers();
        assert!(registry.is_supported("python"));
        assert!(registry.is_supported("TypeScript"));
        assert!(!registry.is_supported("cobol"));
        assert!(registry.parse("x = 1", "x.py", "python").is_some());
        assert!(registry.parse("x = 1", "x.bas", "basic").is_none());
    }

    #[test]
    fn custom_parsers_can_be_registered() {
        struct Stub;
        impl LanguageParser for Stub {
            fn parse(&self, _code: &str, _path: &str) -> ParsedSource {
                ParsedSource {
                    imports: vec!["stub".to_string()],
                    ..Default::default()
                }
            }
        }

        let mut registry = ParserRegistry::new();
        registry.register(&["basic"], Arc::new(Stub));
        let parsed = registry.parse("10 PRINT", "x.bas", "basic").unwrap();
        assert_eq!(parsed.imports, vec!["stub"]);
    }
}
