//! The workspace services shipped with the watcher: one that runs a project
//! watcher per folder and one that keeps milestone views up to date.

use std::sync::Arc;

use appmap_agent::AgentResolver;
use appmap_core::{CompletionState, Subscription, Telemetry};
use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::appmap_files::AppMapFileWatcher;
use crate::config::WatcherConfig;
use crate::consumers::{InstallationBadge, MilestoneTree};
use crate::driver::{WatcherHandle, spawn};
use crate::error::WatcherError;
use crate::project_watcher::ProjectWatcher;
use crate::registry::ProjectRegistry;
use crate::workspace::{WorkspaceFolder, WorkspaceService, WorkspaceServiceInstance};

// ─── Project watcher service ────────────────────────────────────────

pub struct ProjectWatcherService {
    resolver: Arc<dyn AgentResolver>,
    telemetry: Arc<dyn Telemetry>,
    config: WatcherConfig,
    registry: ProjectRegistry,
    watch_files: bool,
}

impl ProjectWatcherService {
    pub fn new(
        resolver: Arc<dyn AgentResolver>,
        telemetry: Arc<dyn Telemetry>,
        config: WatcherConfig,
        registry: ProjectRegistry,
    ) -> Self {
        Self {
            resolver,
            telemetry,
            config,
            registry,
            watch_files: true,
        }
    }

    /// Disable the recursive AppMap file watcher; milestones then only move
    /// on polls and explicit notifications.
    pub fn without_file_watch(mut self) -> Self {
        self.watch_files = false;
        self
    }
}

#[async_trait]
impl WorkspaceService for ProjectWatcherService {
    fn name(&self) -> &'static str {
        "project-watcher"
    }

    async fn create(
        &self,
        folder: &WorkspaceFolder,
    ) -> Result<Box<dyn WorkspaceServiceInstance>, WatcherError> {
        let mut watcher = ProjectWatcher::new(
            &folder.path,
            Arc::clone(&self.resolver),
            Arc::clone(&self.telemetry),
            self.config.clone(),
        );
        watcher.initialize().await?;
        let (handle, task) = spawn(watcher);

        let files = if self.watch_files {
            match AppMapFileWatcher::start(handle.clone(), self.config.appmap_pattern()) {
                Ok(files) => Some(files),
                Err(e) => {
                    tracing::warn!(folder = %folder.path.display(), "AppMap file watch unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        if let Some(previous) = self.registry.insert(handle.clone()) {
            previous.dispose();
        }

        Ok(Box::new(ProjectWatcherInstance {
            folder: folder.clone(),
            handle,
            task: Some(task),
            files,
            registry: self.registry.clone(),
        }))
    }
}

struct ProjectWatcherInstance {
    folder: WorkspaceFolder,
    handle: WatcherHandle,
    task: Option<JoinHandle<()>>,
    files: Option<AppMapFileWatcher>,
    registry: ProjectRegistry,
}

impl WorkspaceServiceInstance for ProjectWatcherInstance {
    fn folder(&self) -> &WorkspaceFolder {
        &self.folder
    }

    fn dispose(&mut self) {
        if let Some(files) = self.files.take() {
            files.stop();
        }
        self.handle.dispose();
        self.registry.remove(&self.folder.path);
        // The task exits on its own once it sees the cancellation.
        self.task.take();
    }
}

// ─── Milestone view service ─────────────────────────────────────────

/// Builds a [`MilestoneTree`] for each watched folder, logs its progress and
/// feeds the shared [`InstallationBadge`].
pub struct MilestoneViewService {
    registry: ProjectRegistry,
    badge: Arc<InstallationBadge>,
}

impl MilestoneViewService {
    pub fn new(registry: ProjectRegistry, badge: Arc<InstallationBadge>) -> Self {
        Self { registry, badge }
    }
}

#[async_trait]
impl WorkspaceService for MilestoneViewService {
    fn name(&self) -> &'static str {
        "milestone-view"
    }

    async fn create(
        &self,
        folder: &WorkspaceFolder,
    ) -> Result<Box<dyn WorkspaceServiceInstance>, WatcherError> {
        let handle = self
            .registry
            .get(&folder.path)
            .ok_or_else(|| WatcherError::UnknownProject(folder.path.clone()))?;

        let tree = MilestoneTree::new(handle.milestones());
        let name = folder.name.clone();
        let progress = tree.on_did_change(move |rows| {
            let complete = rows
                .iter()
                .filter(|r| r.state == CompletionState::Complete)
                .count();
            let next = rows
                .iter()
                .find(|r| r.state != CompletionState::Complete)
                .map(|r| r.id.as_str());
            tracing::info!(folder = %name, complete, total = rows.len(), next = ?next, "milestones updated");
        });
        self.badge.track(&folder.path, handle.milestones());

        Ok(Box::new(MilestoneViewInstance {
            folder: folder.clone(),
            tree: Some(tree),
            progress: Some(progress),
            badge: Arc::clone(&self.badge),
        }))
    }
}

struct MilestoneViewInstance {
    folder: WorkspaceFolder,
    tree: Option<MilestoneTree>,
    progress: Option<Subscription>,
    badge: Arc<InstallationBadge>,
}

impl WorkspaceServiceInstance for MilestoneViewInstance {
    fn folder(&self) -> &WorkspaceFolder {
        &self.folder
    }

    fn dispose(&mut self) {
        self.progress.take();
        self.tree.take();
        self.badge.untrack(&self.folder.path);
    }
}
