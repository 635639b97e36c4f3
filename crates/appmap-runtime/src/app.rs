//! Composition root: builds the agent registry and watcher services from the
//! parsed command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use appmap_agent::{AgentRegistry, AgentResolver, CommandRunner, ProcessRunner};
use appmap_core::Telemetry;
use appmap_watcher::{
    InstallationBadge, MilestoneViewService, ProjectRegistry, ProjectWatcher,
    ProjectWatcherService, TracingTelemetry, WatcherConfig,
};

use crate::cli::Cli;

pub struct App {
    pub config: WatcherConfig,
    pub agents: Arc<AgentRegistry>,
    pub telemetry: Arc<dyn Telemetry>,
    pub watch_files: bool,
}

impl App {
    pub fn from_cli(cli: &Cli) -> Self {
        let config = cli.watcher_config();
        let mut runner = ProcessRunner::new();
        if let Some(timeout) = config.command_timeout {
            runner = runner.with_timeout(timeout);
        }
        let runner: Arc<dyn CommandRunner> = Arc::new(runner);
        Self {
            config,
            agents: Arc::new(AgentRegistry::with_default_agents(runner)),
            telemetry: Arc::new(TracingTelemetry),
            watch_files: !cli.no_file_watch,
        }
    }

    pub fn resolver(&self) -> Arc<dyn AgentResolver> {
        Arc::clone(&self.agents) as Arc<dyn AgentResolver>
    }

    /// An uninitialized watcher for `folder`.
    pub fn watcher(&self, folder: &Path) -> ProjectWatcher {
        ProjectWatcher::new(
            folder,
            self.resolver(),
            Arc::clone(&self.telemetry),
            self.config.clone(),
        )
    }

    pub fn watcher_service(&self, registry: &ProjectRegistry) -> ProjectWatcherService {
        let service = ProjectWatcherService::new(
            self.resolver(),
            Arc::clone(&self.telemetry),
            self.config.clone(),
            registry.clone(),
        );
        if self.watch_files {
            service
        } else {
            service.without_file_watch()
        }
    }

    pub fn milestone_view_service(
        &self,
        registry: &ProjectRegistry,
        badge: &Arc<InstallationBadge>,
    ) -> MilestoneViewService {
        MilestoneViewService::new(registry.clone(), Arc::clone(badge))
    }
}

/// Absolute, symlink-free form of `folder`; fails if it does not exist.
pub fn project_root(folder: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(folder)
        .with_context(|| format!("cannot open project folder {}", folder.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_root_resolves_existing_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = project_root(dir.path()).unwrap();
        assert!(root.is_absolute());
        assert!(project_root(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn registry_supports_ruby_and_python() {
        let cli = <Cli as clap::Parser>::try_parse_from(["appmap-watch", "watch"]).unwrap();
        let app = App::from_cli(&cli);
        assert_eq!(app.agents.supported_languages(), vec!["python", "ruby"]);
        assert!(app.watch_files);
    }
}
