//! Folder → watcher lookup shared by the services that need it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::driver::WatcherHandle;

/// Cloneable map from workspace folder path to its running watcher. Clones
/// share the same map.
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    handles: Arc<RwLock<BTreeMap<PathBuf, WatcherHandle>>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under its root. Returns the handle it replaced.
    pub fn insert(&self, handle: WatcherHandle) -> Option<WatcherHandle> {
        self.handles
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(handle.root().to_path_buf(), handle)
    }

    pub fn remove(&self, root: &Path) -> Option<WatcherHandle> {
        self.handles
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(root)
    }

    pub fn get(&self, root: &Path) -> Option<WatcherHandle> {
        self.handles
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(root)
            .cloned()
    }

    /// All registered watchers, ordered by root path.
    pub fn handles(&self) -> Vec<WatcherHandle> {
        self.handles
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatcherConfig;
    use crate::driver::spawn;
    use crate::project_watcher::ProjectWatcher;
    use crate::test_support::{FixedResolver, MockAgent};
    use appmap_core::NoopTelemetry;

    async fn handle(root: &Path) -> WatcherHandle {
        let agent = Arc::new(MockAgent::new());
        agent.set_installed(false);
        let mut watcher = ProjectWatcher::new(
            root,
            Arc::new(FixedResolver::new("ruby", Some(agent))),
            Arc::new(NoopTelemetry),
            WatcherConfig::default(),
        );
        watcher.initialize().await.unwrap();
        spawn(watcher).0
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_one_map() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let registry = ProjectRegistry::new();
        let view = registry.clone();

        assert!(registry.insert(handle(a.path()).await).is_none());
        assert!(registry.insert(handle(b.path()).await).is_none());
        assert_eq!(view.len(), 2);
        assert_eq!(view.get(a.path()).unwrap().root(), a.path());

        let replaced = registry.insert(handle(a.path()).await);
        assert!(replaced.is_some());
        assert_eq!(view.len(), 2);

        registry.remove(a.path());
        assert!(view.get(a.path()).is_none());
        assert_eq!(view.handles().len(), 1);
    }
}
