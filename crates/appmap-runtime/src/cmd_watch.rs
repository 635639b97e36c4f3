//! `appmap-watch watch`: run watchers for folders until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use appmap_watcher::{InstallationBadge, ProjectRegistry, WorkspaceFolder, WorkspaceServices};

use crate::app::{App, project_root};

/// Entry point for `appmap-watch watch`.
pub async fn cmd_watch(app: &App, folders: &[PathBuf]) -> anyhow::Result<()> {
    let folders = requested_folders(folders)?;

    let registry = ProjectRegistry::new();
    let badge = Arc::new(InstallationBadge::new());
    let _badge_log = badge.on_change(|badge| match badge {
        Some(remaining) => tracing::info!(remaining, "onboarding steps remaining"),
        None => tracing::info!("onboarding badge cleared"),
    });

    let mut services = WorkspaceServices::new();
    services.enroll(Arc::new(app.watcher_service(&registry))).await;
    services
        .enroll(Arc::new(app.milestone_view_service(&registry, &badge)))
        .await;
    for folder in folders {
        services.folder_added(WorkspaceFolder::new(folder)).await;
    }

    if registry.is_empty() {
        anyhow::bail!("none of the given folders is a supported project");
    }
    for handle in registry.handles() {
        let next = handle.milestones().next_incomplete().map(|m| m.id().as_str());
        tracing::info!(
            root = %handle.root().display(),
            language = %handle.language().unwrap_or_default(),
            next = ?next,
            "watching project"
        );
    }

    shutdown_signal().await?;
    services.dispose();
    Ok(())
}

/// Canonical roots for `folders`, or the current directory when none are given.
fn requested_folders(folders: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    if folders.is_empty() {
        return Ok(vec![project_root(&std::env::current_dir()?)?]);
    }
    folders.iter().map(|f| project_root(f)).collect()
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        tracing::info!("received ctrl-c, shutting down");
    }

    Ok(())
}
