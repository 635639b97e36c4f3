//! Recursive file watcher that reports new or rewritten AppMaps to the
//! owning project watcher.

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::driver::WatcherHandle;
use crate::error::WatcherError;

/// Keeps the OS watcher and its forwarding task alive. Dropping it stops both.
pub struct AppMapFileWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl AppMapFileWatcher {
    /// Watch `handle.root()` recursively and forward every file matching
    /// `pattern` that is created or renamed into place. Writes to an existing
    /// AppMap are not reported.
    pub fn start(handle: WatcherHandle, pattern: glob::Pattern) -> Result<Self, WatcherError> {
        // Bridge synchronous notify callbacks into async land.
        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(256);
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.blocking_send(res);
        })?;
        watcher.watch(handle.root(), RecursiveMode::Recursive)?;
        tracing::info!(root = %handle.root().display(), pattern = %pattern, "watching for AppMaps");

        let task = tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(root = %handle.root().display(), "AppMap watcher error: {e}");
                        continue;
                    }
                };
                for path in appmap_paths(&event, &pattern) {
                    if handle.appmap_created(path).await.is_err() {
                        tracing::debug!(root = %handle.root().display(), "project watcher gone; stopping AppMap watcher");
                        return;
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for AppMapFileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Paths in `event` that are new AppMaps.
fn appmap_paths(event: &Event, pattern: &glob::Pattern) -> Vec<PathBuf> {
    let created: &[PathBuf] = match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => &event.paths,
        // [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.last() {
            Some(to) => std::slice::from_ref(to),
            None => &[],
        },
        _ => &[],
    };
    created
        .iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatcherConfig;
    use crate::driver::spawn;
    use crate::project_watcher::ProjectWatcher;
    use crate::test_support::{FixedResolver, MockAgent, config_status};
    use appmap_core::{CompletionState, MilestoneId, NoopTelemetry};
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::sync::Arc;
    use std::time::Duration;

    fn pattern() -> glob::Pattern {
        glob::Pattern::new("*.appmap.json").unwrap()
    }

    #[test]
    fn only_new_appmaps() {
        let paths = vec![
            PathBuf::from("/p/tmp/appmap/a.appmap.json"),
            PathBuf::from("/p/appmap.yml"),
        ];
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(paths[0].clone()).add_path(paths[1].clone());
        assert_eq!(appmap_paths(&created, &pattern()), vec![paths[0].clone()]);

        let written = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(paths[0].clone());
        assert!(appmap_paths(&written, &pattern()).is_empty());
        let touched = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(paths[0].clone());
        assert!(appmap_paths(&touched, &pattern()).is_empty());

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(paths[0].clone());
        assert!(appmap_paths(&removed, &pattern()).is_empty());
    }

    #[test]
    fn renamed_into_place_counts_as_new() {
        let tmp = PathBuf::from("/p/tmp/appmap/a.appmap.json.part");
        let done = PathBuf::from("/p/tmp/appmap/a.appmap.json");

        let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(tmp.clone())
            .add_path(done.clone());
        assert_eq!(appmap_paths(&both, &pattern()), vec![done.clone()]);

        let to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To))).add_path(done.clone());
        assert_eq!(appmap_paths(&to, &pattern()), vec![done.clone()]);

        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From))).add_path(done);
        assert!(appmap_paths(&from, &pattern()).is_empty());

        // Renaming an AppMap away is not a new one.
        let away = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/p/tmp/appmap/b.appmap.json"))
            .add_path(PathBuf::from("/p/tmp/appmap/b.bak"));
        assert!(appmap_paths(&away, &pattern()).is_empty());
    }

    #[tokio::test]
    async fn new_appmap_completes_record_milestone() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tmp/appmap");
        std::fs::create_dir_all(&out).unwrap();
        let agent = Arc::new(MockAgent::new());
        agent.push_status(Ok(Some(config_status(true, true))));
        let mut watcher = ProjectWatcher::new(
            dir.path(),
            Arc::new(FixedResolver::new("ruby", Some(agent))),
            Arc::new(NoopTelemetry),
            WatcherConfig::default(),
        );
        watcher.initialize().await.unwrap();
        let (handle, _task) = spawn(watcher);
        let _files = AppMapFileWatcher::start(handle.clone(), pattern()).unwrap();

        std::fs::write(out.join("login.appmap.json"), "{}").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while handle.milestones().state(MilestoneId::RecordAppmap) != CompletionState::Complete {
            assert!(tokio::time::Instant::now() < deadline, "AppMap was never reported");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
