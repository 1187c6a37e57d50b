//! Language analyzer registry.
//!
//! Central registration point for all language analyzers. The registry
//! is initialized once at startup and provides thread-safe access to
//! language-specific analyzers.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::types::Language;
use super::LanguageAnalyzer;

/// Global registry instance.
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the global language analyzer registry.
pub fn global_registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Registry of language analyzers.
pub struct Registry {
    analyzers: HashMap<Language, Box<dyn LanguageAnalyzer>>,
}

impl Registry {
    /// Create a new registry with all supported languages registered.
    fn new() -> Self {
        let mut analyzers: HashMap<Language, Box<dyn LanguageAnalyzer>> = HashMap::new();

        use super::languages::*;

        analyzers.insert(Language::Python, Box::new(python::PythonAnalyzer));
        analyzers.insert(Language::Rust, Box::new(rust::RustAnalyzer));
        analyzers.insert(Language::TypeScript, Box::new(typescript::TypeScriptAnalyzer));
        analyzers.insert(Language::JavaScript, Box::new(javascript::JavaScriptAnalyzer));
        analyzers.insert(Language::Go, Box::new(go::GoAnalyzer));
        analyzers.insert(Language::Java, Box::new(java::JavaAnalyzer));
        analyzers.insert(Language::C, Box::new(c::CAnalyzer));
        analyzers.insert(Language::Cpp, Box::new(cpp::CppAnalyzer));
        analyzers.insert(Language::CSharp, Box::new(csharp::CSharpAnalyzer));
        analyzers.insert(Language::Css, Box::new(css::CssAnalyzer));
        analyzers.insert(Language::Ruby, Box::new(ruby::RubyAnalyzer));
        analyzers.insert(Language::Php, Box::new(php::PhpAnalyzer));
        analyzers.insert(Language::Swift, Box::new(swift::SwiftAnalyzer));
        analyzers.insert(Language::Kotlin, Box::new(kotlin::KotlinAnalyzer));

        // Document/config formats share one text-based analyzer, parameterized
        // by language so heading/key extraction matches the format.
        analyzers.insert(Language::Markdown, Box::new(document::DocumentAnalyzer::new(Language::Markdown)));
        analyzers.insert(Language::Toml, Box::new(document::DocumentAnalyzer::new(Language::Toml)));
        analyzers.insert(Language::Yaml, Box::new(document::DocumentAnalyzer::new(Language::Yaml)));
        analyzers.insert(Language::Json, Box::new(document::DocumentAnalyzer::new(Language::Json)));
        analyzers.insert(Language::Html, Box::new(document::DocumentAnalyzer::new(Language::Html)));
        analyzers.insert(Language::Shell, Box::new(document::DocumentAnalyzer::new(Language::Shell)));

        Self { analyzers }
    }

    /// Get the analyzer for a given language.
    pub fn get(&self, language: Language) -> Option<&dyn LanguageAnalyzer> {
        self.analyzers.get(&language).map(|a| a.as_ref())
    }

    /// List all registered languages.
    pub fn languages(&self) -> Vec<Language> {
        self.analyzers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_all_code_languages() {
        let reg = global_registry();
        for lang in [
            Language::Python,
            Language::Rust,
            Language::TypeScript,
            Language::JavaScript,
            Language::Go,
            Language::Java,
            Language::C,
            Language::Cpp,
            Language::CSharp,
            Language::Css,
            Language::Ruby,
            Language::Php,
            Language::Swift,
            Language::Kotlin,
        ] {
            assert!(reg.get(lang).is_some(), "{lang} should have an analyzer");
        }
    }

    #[test]
    fn test_registry_has_all_document_formats() {
        let reg = global_registry();
        for lang in [
            Language::Markdown,
            Language::Toml,
            Language::Yaml,
            Language::Json,
            Language::Html,
            Language::Shell,
        ] {
            assert!(reg.get(lang).is_some(), "{lang} should have an analyzer");
        }
    }

    #[test]
    fn test_registry_returns_none_for_unknown() {
        let reg = global_registry();
        assert!(reg.get(Language::Unknown).is_none());
    }
}
