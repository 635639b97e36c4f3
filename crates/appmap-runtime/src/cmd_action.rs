//! `appmap-watch action`: perform one milestone action and print the result.

use appmap_core::MilestoneSnapshot;
use serde_json::json;

use crate::app::{App, project_root};
use crate::cli::ActionOpts;

/// Entry point for `appmap-watch action`.
pub async fn cmd_action(app: &App, opts: &ActionOpts) -> anyhow::Result<()> {
    let root = project_root(&opts.folder)?;
    let mut watcher = app.watcher(&root);
    if let Some(language) = &opts.language {
        watcher.set_language(language).await?;
    }
    watcher.initialize().await?;

    let data = opts.command.as_ref().map(|command| json!({ "command": command }));
    let result = watcher
        .perform_milestone_action(opts.milestone, data.as_ref())
        .await;
    let milestones: Vec<MilestoneSnapshot> = watcher.milestones().snapshot();
    watcher.dispose();

    result?;
    println!("{}", serde_json::to_string_pretty(&milestones)?);
    Ok(())
}
