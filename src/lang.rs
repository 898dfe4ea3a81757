//! Language classification for changed files
//!
//! Maps a file path to a source-language tag via a fixed suffix table,
//! then a filename-prefix table (`Dockerfile*`). Paths matching neither
//! are not analyzable and are silently dropped. Pure and total: safe to
//! call concurrently, never fails for any input string.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Languages the remote analyzer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Language {
    Apex,
    C,
    Cpp,
    Dart,
    Docker,
    Go,
    Java,
    JavaScript,
    Kotlin,
    Php,
    Python,
    Ruby,
    Rust,
    Scala,
    Shell,
    TypeScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Apex => "Apex",
            Language::C => "C",
            Language::Cpp => "Cpp",
            Language::Dart => "Dart",
            Language::Docker => "Docker",
            Language::Go => "Go",
            Language::Java => "Java",
            Language::JavaScript => "Javascript",
            Language::Kotlin => "Kotlin",
            Language::Php => "Php",
            Language::Python => "Python",
            Language::Ruby => "Ruby",
            Language::Rust => "Rust",
            Language::Scala => "Scala",
            Language::Shell => "Shell",
            Language::TypeScript => "Typescript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suffix rules, checked first. No two suffixes overlap, so first match
/// in table order wins.
const SUFFIX_RULES: &[(&str, Language)] = &[
    (".py", Language::Python),
    (".py3", Language::Python),
    (".c", Language::C),
    (".cc", Language::Cpp),
    (".cpp", Language::Cpp),
    (".cxx", Language::Cpp),
    (".php", Language::Php),
    (".php4", Language::Php),
    (".java", Language::Java),
    (".js", Language::JavaScript),
    (".jsx", Language::JavaScript),
    (".kt", Language::Kotlin),
    (".rb", Language::Ruby),
    (".sh", Language::Shell),
    (".scala", Language::Scala),
    (".rs", Language::Rust),
    (".go", Language::Go),
    (".ts", Language::TypeScript),
    (".tsx", Language::TypeScript),
    (".dart", Language::Dart),
    (".cls", Language::Apex),
];

/// Filename-prefix rules, checked after suffixes.
const PREFIX_RULES: &[(&str, Language)] = &[("Dockerfile", Language::Docker)];

/// Classify a single path, `None` when no rule matches.
pub fn language_for_path(path: &str) -> Option<Language> {
    for (suffix, language) in SUFFIX_RULES {
        if path.ends_with(suffix) {
            return Some(*language);
        }
    }
    let filename = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path);
    for (prefix, language) in PREFIX_RULES {
        if filename.starts_with(prefix) {
            return Some(*language);
        }
    }
    None
}

/// Classify a set of paths, dropping the ones with no matching language.
pub fn classify<'a, I>(paths: I) -> BTreeMap<String, Language>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut classified = BTreeMap::new();
    for path in paths {
        if let Some(language) = language_for_path(path) {
            classified.insert(path.to_string(), language);
        }
    }
    classified
}
