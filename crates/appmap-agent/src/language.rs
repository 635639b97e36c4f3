//! Project language detection.
//!
//! Walks a project tree (honouring `.gitignore`, skipping `.git`), counts
//! source files per language by extension and reports each language's
//! share of the total. The best fit is the language with the largest share.
//! Results are cached per root for the lifetime of the resolver.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ignore::WalkBuilder;
use serde::Serialize;

use crate::error::AgentError;

pub const UNKNOWN_LANGUAGE: &str = "unknown";

#[derive(Debug, Clone, Copy)]
pub struct Language {
    pub id: &'static str,
    pub name: &'static str,
    pub extensions: &'static [&'static str],
}

pub const LANGUAGES: &[Language] = &[
    Language { id: "c", name: "C", extensions: &["c"] },
    Language { id: "c++", name: "C++", extensions: &["c++", "cc", "cpp", "cxx", "h", "h++", "hh", "hpp", "hxx"] },
    Language { id: "clojure", name: "Clojure", extensions: &["clj", "cljc", "cljs", "cljx", "clojure", "edn"] },
    Language { id: "csharp", name: "C#", extensions: &["cake", "cs", "csx"] },
    Language { id: "dart", name: "Dart", extensions: &["dart"] },
    Language { id: "elixir", name: "Elixir", extensions: &["ex", "exs"] },
    Language { id: "erlang", name: "Erlang", extensions: &["erl", "hrl", "xrl", "yrl"] },
    Language { id: "go", name: "Go", extensions: &["go"] },
    Language { id: "groovy", name: "Groovy", extensions: &["gradle", "groovy", "gvy"] },
    Language { id: "haskell", name: "Haskell", extensions: &["hs"] },
    Language { id: "java", name: "Java", extensions: &["jav", "java"] },
    Language { id: "javascript", name: "JavaScript", extensions: &["cjs", "es6", "js", "jsx", "mjs"] },
    Language { id: "kotlin", name: "Kotlin", extensions: &["kt", "kts"] },
    Language { id: "lua", name: "Lua", extensions: &["lua"] },
    Language { id: "objective-c", name: "Objective-C", extensions: &["m"] },
    Language { id: "ocaml", name: "OCaml", extensions: &["ml", "mli"] },
    Language { id: "perl", name: "Perl", extensions: &["pl", "pm", "pod", "psgi", "t"] },
    Language { id: "php", name: "PHP", extensions: &["ctp", "php", "php4", "php5", "phtml"] },
    Language { id: "python", name: "Python", extensions: &["cpy", "gyp", "ipy", "py", "pyi", "pyw", "rpy"] },
    Language { id: "ruby", name: "Ruby", extensions: &["erb", "gemspec", "podspec", "rake", "rb", "rbi", "rbx", "rjs", "ru"] },
    Language { id: "rust", name: "Rust", extensions: &["rs"] },
    Language { id: "scala", name: "Scala", extensions: &["sbt", "sc", "scala"] },
    Language { id: "swift", name: "Swift", extensions: &["swift"] },
    Language { id: "typescript", name: "TypeScript", extensions: &["cts", "mts", "ts", "tsx"] },
    Language { id: "visualbasic", name: "Visual Basic", extensions: &["bas", "brs", "vb", "vbs"] },
];

/// Language id for a file extension (without the leading dot).
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|lang| lang.extensions.contains(&ext))
        .map(|lang| lang.id)
}

/// Share of source files per language id. Shares sum to 1.0 unless empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LanguageDistribution(BTreeMap<String, f64>);

impl LanguageDistribution {
    pub fn from_counts(counts: BTreeMap<String, usize>) -> Self {
        let total: usize = counts.values().sum();
        if total == 0 {
            return Self::default();
        }
        let shares = counts
            .into_iter()
            .map(|(lang, count)| (lang, count as f64 / total as f64))
            .collect();
        Self(shares)
    }

    pub fn share(&self, language: &str) -> f64 {
        self.0.get(language).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(lang, share)| (lang.as_str(), *share))
    }

    /// Language with the largest share; ties go to the first id in order.
    pub fn best_fit(&self) -> &str {
        let mut best = UNKNOWN_LANGUAGE;
        let mut max = 0.0;
        for (lang, share) in self.iter() {
            if share > max {
                best = lang;
                max = share;
            }
        }
        best
    }
}

impl fmt::Display for LanguageDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no source files found");
        }
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let parts: Vec<String> = entries
            .iter()
            .map(|(lang, share)| format!("{lang} {:.1}%", share * 100.0))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Cached per-root language detection. Clones share the cache.
#[derive(Debug, Clone, Default)]
pub struct LanguageResolver {
    cache: Arc<Mutex<HashMap<PathBuf, LanguageDistribution>>>,
}

impl LanguageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Language distribution for `root`, computed once and cached.
    /// Blocking: walks the file system.
    pub fn distribution(&self, root: &Path) -> Result<LanguageDistribution, AgentError> {
        if let Some(cached) = self.cache.lock().unwrap_or_else(|p| p.into_inner()).get(root) {
            return Ok(cached.clone());
        }

        let distribution = scan(root)?;
        tracing::debug!(root = %root.display(), %distribution, "language distribution");
        self.cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(root.to_path_buf(), distribution.clone());
        Ok(distribution)
    }

    pub fn language(&self, root: &Path) -> Result<String, AgentError> {
        Ok(self.distribution(root)?.best_fit().to_string())
    }
}

fn scan(root: &Path) -> Result<LanguageDistribution, AgentError> {
    if !root.is_dir() {
        return Err(AgentError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        )));
    }

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(root = %root.display(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let language = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(language_for_extension);
        if let Some(language) = language {
            *counts.entry(language.to_string()).or_default() += 1;
        }
    }

    Ok(LanguageDistribution::from_counts(counts))
}
