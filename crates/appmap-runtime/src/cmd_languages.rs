//! `appmap-watch languages`: language distribution of a folder.

use std::path::Path;

use appmap_agent::AgentResolver;
use serde::Serialize;

use crate::app::{App, project_root};

#[derive(Debug, Serialize)]
pub(crate) struct LanguageReport {
    pub language: String,
    pub supported: bool,
    pub distribution: appmap_agent::LanguageDistribution,
}

pub(crate) async fn language_report(app: &App, folder: &Path) -> anyhow::Result<LanguageReport> {
    let root = project_root(folder)?;
    let resolution = app.agents.resolve(&root).await?;
    Ok(LanguageReport {
        supported: resolution.agent.is_some(),
        language: resolution.language,
        distribution: resolution.distribution,
    })
}

/// Entry point for `appmap-watch languages`.
pub async fn cmd_languages(app: &App, folder: &Path) -> anyhow::Result<()> {
    let report = language_report(app, folder).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
