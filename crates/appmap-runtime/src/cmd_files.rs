//! `appmap-watch files`: the agent's view of a project's layout.

use std::path::Path;
use std::sync::Arc;

use appmap_agent::{AgentResolver, AppMapAgent};

use crate::app::{App, project_root};

/// Agent for `root`: the one named by `language`, else the detected one.
pub(crate) async fn select_agent(
    app: &App,
    root: &Path,
    language: Option<&str>,
) -> anyhow::Result<Arc<dyn AppMapAgent>> {
    if let Some(language) = language {
        return Ok(app.agents.require_agent(language)?);
    }
    let resolution = app.agents.resolve(root).await?;
    resolution.agent.ok_or_else(|| {
        anyhow::anyhow!(
            "no AppMap agent supports `{}` (detected languages: {})",
            resolution.language,
            resolution.distribution
        )
    })
}

/// Entry point for `appmap-watch files`.
pub async fn cmd_files(app: &App, folder: &Path, language: Option<&str>) -> anyhow::Result<()> {
    let root = project_root(folder)?;
    let agent = select_agent(app, &root, language).await?;
    let files = agent.files(&root).await?;
    println!("{}", serde_json::to_string_pretty(&files)?);
    Ok(())
}
