//! Extension to language classification.
//!
//! The mapping lives in one explicit, inspectable table. Adding a language
//! means adding rows to the table (or to the `[languages]` section of the
//! config file); the counting code never changes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::RepolocError;
use crate::Result;

/// Languages known out of the box, with their (lower-case) extensions.
const BUILTIN_LANGUAGES: &[(&str, &[&str])] = &[
    ("Assembly", &["asm", "s"]),
    ("C", &["c", "h"]),
    ("C#", &["cs"]),
    ("C++", &["cc", "cpp", "cxx", "c++", "hh", "hpp", "hxx"]),
    ("CSS", &["css"]),
    ("Clojure", &["clj", "cljs", "cljc", "edn"]),
    ("CMake", &["cmake"]),
    ("Dart", &["dart"]),
    ("Elixir", &["ex", "exs"]),
    ("Erlang", &["erl", "hrl"]),
    ("F#", &["fs", "fsi", "fsx"]),
    ("Fortran", &["f", "f77", "f90", "f95", "for"]),
    ("Go", &["go"]),
    ("Groovy", &["groovy", "gradle"]),
    ("HTML", &["htm", "html", "xhtml"]),
    ("Haskell", &["hs", "lhs"]),
    ("JSON", &["json"]),
    ("Java", &["java"]),
    ("JavaScript", &["cjs", "js", "jsx", "mjs"]),
    ("Julia", &["jl"]),
    ("Kotlin", &["kt", "kts"]),
    ("Less", &["less"]),
    ("Lisp", &["el", "lisp", "lsp"]),
    ("Lua", &["lua"]),
    ("Markdown", &["md", "markdown"]),
    ("OCaml", &["ml", "mli"]),
    ("Objective-C", &["m", "mm"]),
    ("PHP", &["php"]),
    ("Perl", &["pl", "pm"]),
    ("PowerShell", &["ps1", "psm1"]),
    ("Protocol Buffers", &["proto"]),
    ("Python", &["py", "pyi", "pyw"]),
    ("R", &["r"]),
    ("Ruby", &["rb", "rake"]),
    ("Rust", &["rs"]),
    ("SCSS", &["sass", "scss"]),
    ("SQL", &["sql"]),
    ("Scala", &["sc", "scala"]),
    ("Shell", &["bash", "sh", "zsh"]),
    ("Swift", &["swift"]),
    ("TOML", &["toml"]),
    ("Text", &["txt"]),
    ("TypeScript", &["cts", "mts", "ts", "tsx"]),
    ("Vue", &["vue"]),
    ("XML", &["xml", "xsd", "xsl"]),
    ("YAML", &["yaml", "yml"]),
    ("Zig", &["zig"]),
    ("reStructuredText", &["rst"]),
];

/// Label derived from a file's extension.
///
/// Tags compare by their display name, so `Unclassified` sorts among the
/// named languages like any other label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LanguageTag {
    Named(Arc<str>),
    Unclassified,
}

impl LanguageTag {
    pub fn named(name: &str) -> Self {
        Self::Named(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Unclassified => "Unclassified",
        }
    }
}

impl Ord for LanguageTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str()
            .cmp(other.as_str())
            .then_with(|| matches!(self, Self::Unclassified).cmp(&matches!(other, Self::Unclassified)))
    }
}

impl PartialOrd for LanguageTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Total mapping from file extension to [`LanguageTag`].
///
/// Every extension maps either to exactly one language or, when absent from
/// the table, to [`LanguageTag::Unclassified`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageTable {
    by_extension: BTreeMap<String, Arc<str>>,
}

impl Default for LanguageTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LanguageTable {
    /// A table with no mappings: everything is `Unclassified`.
    pub fn empty() -> Self {
        Self {
            by_extension: BTreeMap::new(),
        }
    }

    /// The built-in table.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for (language, extensions) in BUILTIN_LANGUAGES {
            let language: Arc<str> = Arc::from(*language);
            for extension in *extensions {
                table
                    .by_extension
                    .insert((*extension).to_string(), Arc::clone(&language));
            }
        }
        table
    }

    /// Map `extension` (with or without a leading dot, any case) to `language`,
    /// replacing an existing mapping.
    pub fn insert(&mut self, extension: &str, language: &str) -> Result<()> {
        let extension = normalize_extension(extension);
        if extension.is_empty() {
            return Err(RepolocError::Config(
                "language mapping with an empty extension".to_string(),
            ));
        }
        let language = language.trim();
        if language.is_empty() {
            return Err(RepolocError::Config(format!(
                "extension '{extension}' maps to an empty language name"
            )));
        }
        if language == LanguageTag::Unclassified.as_str() {
            return Err(RepolocError::Config(format!(
                "extension '{extension}' cannot map to the reserved name 'Unclassified'"
            )));
        }

        // Reuse the shared name when the language is already known.
        let name = self
            .by_extension
            .values()
            .find(|known| &***known == language)
            .cloned()
            .unwrap_or_else(|| Arc::from(language));
        self.by_extension.insert(extension, name);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, extension: &str, language: &str) -> Result<Self> {
        self.insert(extension, language)?;
        Ok(self)
    }

    /// Classify a path by the extension of its final component.
    pub fn classify(&self, path: &Path) -> LanguageTag {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.lookup(ext))
            .unwrap_or(LanguageTag::Unclassified)
    }

    /// Look up a bare extension, case-insensitively.
    pub fn lookup(&self, extension: &str) -> LanguageTag {
        self.by_extension
            .get(&normalize_extension(extension))
            .map(|name| LanguageTag::Named(Arc::clone(name)))
            .unwrap_or(LanguageTag::Unclassified)
    }

    /// All mappings, ordered by extension.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_extension
            .iter()
            .map(|(ext, language)| (ext.as_str(), &**language))
    }

    /// Distinct language names in the table.
    pub fn languages(&self) -> BTreeSet<&str> {
        self.by_extension.values().map(|name| &**name).collect()
    }

    pub fn len(&self) -> usize {
        self.by_extension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_case_insensitive() {
        let table = LanguageTable::builtin();

        assert_eq!(table.classify(Path::new("src/main.rs")), LanguageTag::named("Rust"));
        assert_eq!(table.classify(Path::new("LEGACY.RS")), LanguageTag::named("Rust"));
        assert_eq!(table.classify(Path::new("a/b/Setup.Py")), LanguageTag::named("Python"));
    }

    #[test]
    fn test_classify_uses_final_suffix() {
        let table = LanguageTable::builtin();

        assert_eq!(table.classify(Path::new("types.d.ts")), LanguageTag::named("TypeScript"));
        assert_eq!(table.classify(Path::new("archive.tar.gz")), LanguageTag::Unclassified);
        assert_eq!(table.classify(Path::new("lib.rs.bak")), LanguageTag::Unclassified);
    }

    #[test]
    fn test_classify_without_extension() {
        let table = LanguageTable::builtin();

        assert_eq!(table.classify(Path::new("Makefile")), LanguageTag::Unclassified);
        assert_eq!(table.classify(Path::new(".gitignore")), LanguageTag::Unclassified);
        assert_eq!(table.classify(Path::new("dir.d/")), LanguageTag::Unclassified);
    }

    #[test]
    fn test_classification_is_total_over_fixture() {
        let table = LanguageTable::builtin();
        let fixture = [
            "a.rs", "b.py", "c.unknownext", "d", "e.JSON", "f.h", "g.", ".env", "h.yml",
        ];

        for name in fixture {
            match table.classify(Path::new(name)) {
                LanguageTag::Named(language) => {
                    assert!(table.languages().contains(&*language), "{name} -> {language}")
                }
                LanguageTag::Unclassified => {}
            }
        }
    }

    #[test]
    fn test_insert_extends_and_overrides() {
        let table = LanguageTable::builtin()
            .with(".Jsonnet", "Jsonnet")
            .unwrap()
            .with("h", "C++")
            .unwrap();

        assert_eq!(table.lookup("jsonnet"), LanguageTag::named("Jsonnet"));
        assert_eq!(table.lookup("H"), LanguageTag::named("C++"));
        assert_eq!(table.lookup("c"), LanguageTag::named("C"));
    }

    #[test]
    fn test_insert_rejects_empty() {
        let mut table = LanguageTable::empty();

        assert!(table.insert("", "Rust").is_err());
        assert!(table.insert(".", "Rust").is_err());
        assert!(table.insert("rs", "  ").is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_reserved_unclassified_name_is_rejected() {
        let err = LanguageTable::builtin()
            .with("foo", "Unclassified")
            .unwrap_err();

        assert!(matches!(err, RepolocError::Config(_)));
        assert!(err.to_string().contains("'foo'"));

        let table = LanguageTable::builtin().with("foo", " Unclassified ");
        assert!(table.is_err());
    }

    #[test]
    fn test_empty_table_classifies_nothing() {
        let table = LanguageTable::empty();

        assert_eq!(table.classify(Path::new("main.rs")), LanguageTag::Unclassified);
    }

    #[test]
    fn test_tags_order_by_name() {
        let mut tags = vec![
            LanguageTag::Unclassified,
            LanguageTag::named("Rust"),
            LanguageTag::named("C"),
            LanguageTag::named("YAML"),
        ];
        tags.sort();

        let names: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
        assert_eq!(names, vec!["C", "Rust", "Unclassified", "YAML"]);
    }

    #[test]
    fn test_builtin_table_is_inspectable() {
        let table = LanguageTable::builtin();

        assert!(table.iter().any(|(ext, lang)| ext == "rs" && lang == "Rust"));
        assert!(table.languages().contains("Markdown"));
        assert!(table.iter().all(|(ext, _)| ext == ext.to_lowercase()));
    }
}
