//! `appmap-watch status`: print the agent's raw status for a folder.

use std::path::Path;

use appmap_agent::AgentResolver;

use crate::app::{App, project_root};

/// Entry point for `appmap-watch status`.
pub async fn cmd_status(app: &App, folder: &Path) -> anyhow::Result<()> {
    let root = project_root(folder)?;
    let resolution = app.agents.resolve(&root).await?;
    let Some(agent) = resolution.agent else {
        anyhow::bail!(
            "no AppMap agent supports `{}` (detected languages: {})",
            resolution.language,
            resolution.distribution
        );
    };

    if !agent.is_installed(&root).await? {
        anyhow::bail!(
            "the {} AppMap agent is not installed in {}",
            agent.language(),
            root.display()
        );
    }

    match agent.status(&root).await? {
        Some(status) => println!("{}", serde_json::to_string_pretty(status.raw())?),
        None => println!("null"),
    }
    Ok(())
}
