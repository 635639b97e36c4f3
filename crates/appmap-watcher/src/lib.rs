//! appmap-watcher: per-project onboarding watcher.
//!
//! A [`ProjectWatcher`] polls its agent on a timer, drives the
//! wait-for-install / watch-status state machine and keeps the project's
//! milestones current. [`spawn`] moves it onto its own task and hands back a
//! [`WatcherHandle`]; [`WorkspaceServices`] fans services out over workspace
//! folders.

pub mod appmap_files;
pub mod artifacts;
pub mod config;
pub mod consumers;
pub mod driver;
pub mod error;
pub mod project_watcher;
pub mod registry;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod workspace;

#[cfg(test)]
mod test_support;

pub use appmap_files::AppMapFileWatcher;
pub use artifacts::ProjectArtifacts;
pub use config::{DEFAULT_APPMAP_GLOB, DEFAULT_POLL_INTERVAL, WatcherConfig};
pub use consumers::{InstallationBadge, MilestoneRow, MilestoneTree};
pub use driver::{WatcherHandle, spawn};
pub use error::WatcherError;
pub use project_watcher::{Lifecycle, ProjectWatcher};
pub use registry::ProjectRegistry;
pub use services::{MilestoneViewService, ProjectWatcherService};
pub use state::WatcherState;
pub use telemetry::TracingTelemetry;
pub use workspace::{WorkspaceFolder, WorkspaceService, WorkspaceServiceInstance, WorkspaceServices};
