//! The `AppMapAgent` capability consumed by the project watcher.
//!
//! An agent wraps one language's AppMap CLI. Every operation runs against a
//! project root directory and either returns parsed CLI output or fails with
//! an [`AgentError`] describing the subprocess or parse failure.

use std::path::{Path, PathBuf};

use appmap_core::{StatusCommand, StatusSnapshot};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::executor::{CommandRunner, CommandSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallResult {
    None,
    Upgraded,
    Installed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationFile {
    pub filename: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {
    pub configuration: ConfigurationFile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilesResponse {
    pub configuration: Vec<PathBuf>,
    pub test_directories: Vec<PathBuf>,
    pub integration_test_paths: Vec<PathBuf>,
    pub appmap_directory: Vec<PathBuf>,
}

#[async_trait]
pub trait AppMapAgent: Send + Sync {
    /// Language identifier this agent supports (`"ruby"`, `"python"`).
    fn language(&self) -> &str;

    async fn is_installed(&self, root: &Path) -> Result<bool, AgentError>;

    /// Install or upgrade the agent in the project.
    async fn install(&self, root: &Path) -> Result<InstallResult, AgentError>;

    /// Generate a default configuration for the project.
    async fn init(&self, root: &Path) -> Result<InitResponse, AgentError>;

    async fn files(&self, root: &Path) -> Result<FilesResponse, AgentError>;

    /// Current project status. `Ok(None)` when the CLI reports no status.
    async fn status(&self, root: &Path) -> Result<Option<StatusSnapshot>, AgentError>;

    /// Run `command`, or every test command the agent advertises when `None`.
    async fn test(&self, root: &Path, command: Option<&str>) -> Result<(), AgentError>;
}

/// Run `spec` and parse its stdout as JSON.
pub(crate) async fn run_json<T: DeserializeOwned>(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
) -> Result<T, AgentError> {
    let stdout = runner.run(spec).await?.into_stdout(spec)?;
    serde_json::from_str(stdout.trim()).map_err(|source| AgentError::Parse {
        command: spec.to_string(),
        source,
    })
}

/// Parse status output; a JSON `null` means "no status".
pub(crate) async fn run_status(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
) -> Result<Option<StatusSnapshot>, AgentError> {
    let raw: serde_json::Value = run_json(runner, spec).await?;
    Ok((!raw.is_null()).then(|| StatusSnapshot::new(raw)))
}

/// Run test commands one after another, stopping at the first failure.
pub(crate) async fn run_test_commands(
    runner: &dyn CommandRunner,
    root: &Path,
    commands: &[StatusCommand],
) -> Result<(), AgentError> {
    for command in commands {
        let cwd = match &command.working_directory {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };
        let spec = CommandSpec::shell(&command.command, &cwd);
        tracing::info!(root = %root.display(), command = %command.command, "running test command");
        runner.run(&spec).await?.into_stdout(&spec)?;
    }
    Ok(())
}

/// Resolve the commands `test` should run.
pub(crate) async fn test_commands_for(
    agent: &dyn AppMapAgent,
    root: &Path,
    command: Option<&str>,
) -> Result<Vec<StatusCommand>, AgentError> {
    if let Some(command) = command {
        return Ok(vec![StatusCommand {
            command: command.to_string(),
            working_directory: None,
            framework: None,
        }]);
    }
    Ok(agent
        .status(root)
        .await?
        .map(|status| status.test_commands())
        .unwrap_or_default())
}
