//! Persistent per-project facts: has an AppMap been recorded, has one been
//! opened. Both flags only ever go from `false` to `true`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ProjectArtifacts {
    has_appmap: AtomicBool,
    appmap_opened: AtomicBool,
}

impl ProjectArtifacts {
    pub fn has_appmap(&self) -> bool {
        self.has_appmap.load(Ordering::Acquire)
    }

    pub fn appmap_opened(&self) -> bool {
        self.appmap_opened.load(Ordering::Acquire)
    }

    /// Returns `true` if this call flipped the flag.
    pub fn record_appmap(&self) -> bool {
        !self.has_appmap.swap(true, Ordering::AcqRel)
    }

    pub fn record_opened(&self) -> bool {
        !self.appmap_opened.swap(true, Ordering::AcqRel)
    }

    /// Scan `root` for an existing AppMap matching `pattern` (file name only).
    /// Returns whether one was found and records it.
    pub fn scan(&self, root: &Path, pattern: &glob::Pattern) -> bool {
        if find_appmap(root, pattern) {
            self.record_appmap();
        }
        self.has_appmap()
    }
}

fn find_appmap(root: &Path, pattern: &glob::Pattern) -> bool {
    let query = format!(
        "{}/**/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        pattern.as_str()
    );

    match glob::glob(&query) {
        Ok(paths) => paths.filter_map(Result::ok).any(|p| p.is_file()),
        Err(e) => {
            tracing::warn!(root = %root.display(), "AppMap scan failed: {e}");
            false
        }
    }
}
