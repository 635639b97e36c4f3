//! Python agent: the `appmap` package, run through Poetry when the project
//! uses it and directly otherwise.

use std::path::Path;
use std::sync::Arc;

use appmap_core::StatusSnapshot;
use async_trait::async_trait;

use crate::agent::{
    AppMapAgent, FilesResponse, InitResponse, InstallResult, run_json, run_status,
    run_test_commands, test_commands_for,
};
use crate::error::AgentError;
use crate::executor::{CommandRunner, CommandSpec};

pub struct PythonAgent {
    runner: Arc<dyn CommandRunner>,
}

impl PythonAgent {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn uses_poetry(&self, root: &Path) -> bool {
        let spec = CommandSpec::new("poetry", root).args(["check"]);
        matches!(self.runner.run(&spec).await, Ok(output) if output.success())
    }

    /// Build `cmd args`, wrapped in `poetry run` for Poetry projects.
    async fn project_command(&self, root: &Path, cmd: &str, args: &[&str]) -> CommandSpec {
        if self.uses_poetry(root).await {
            CommandSpec::new("poetry", root)
                .args(["run", cmd])
                .args(args.iter().copied())
                .env("APPMAP_AGENT_POETRY", "true")
                .env("APPMAP_LOG_LEVEL", "info")
        } else {
            CommandSpec::new(cmd, root).args(args.iter().copied())
        }
    }
}

#[async_trait]
impl AppMapAgent for PythonAgent {
    fn language(&self) -> &str {
        "python"
    }

    async fn is_installed(&self, root: &Path) -> Result<bool, AgentError> {
        let spec = self.project_command(root, "pip", &["show", "appmap"]).await;
        match self.runner.run(&spec).await {
            Ok(output) => Ok(output.success()),
            Err(e) => {
                tracing::debug!(root = %root.display(), "pip unavailable: {e}");
                Ok(false)
            }
        }
    }

    async fn install(&self, root: &Path) -> Result<InstallResult, AgentError> {
        let upgrading = self.is_installed(root).await?;
        let spec = if self.uses_poetry(root).await {
            let args: &[&str] = if upgrading {
                &["update", "appmap"]
            } else {
                &["add", "--dev", "appmap"]
            };
            CommandSpec::new("poetry", root).args(args.iter().copied())
        } else {
            CommandSpec::new("pip", root).args(["install", "--upgrade", "appmap"])
        };
        self.runner.run(&spec).await?.into_stdout(&spec)?;

        Ok(if upgrading {
            InstallResult::Upgraded
        } else {
            InstallResult::Installed
        })
    }

    async fn init(&self, root: &Path) -> Result<InitResponse, AgentError> {
        let spec = self.project_command(root, "appmap-agent-init", &[]).await;
        run_json(self.runner.as_ref(), &spec).await
    }

    async fn files(&self, root: &Path) -> Result<FilesResponse, AgentError> {
        let spec = self.project_command(root, "appmap-agent-files", &[]).await;
        run_json(self.runner.as_ref(), &spec).await
    }

    async fn status(&self, root: &Path) -> Result<Option<StatusSnapshot>, AgentError> {
        let spec = self.project_command(root, "appmap-agent-status", &[]).await;
        run_status(self.runner.as_ref(), &spec).await
    }

    async fn test(&self, root: &Path, command: Option<&str>) -> Result<(), AgentError> {
        let commands = test_commands_for(self, root, command).await?;
        run_test_commands(self.runner.as_ref(), root, &commands).await
    }
}
