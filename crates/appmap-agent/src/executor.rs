//! CommandRunner trait and ProcessRunner (async subprocess wrapper).
//! Agents never spawn processes directly so tests can inject scripted output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::AgentError;

/// A command to run inside a project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run `script` through the platform shell.
    pub fn shell(script: &str, cwd: &Path) -> Self {
        if cfg!(windows) {
            Self::new("cmd", cwd).args(["/C", script])
        } else {
            Self::new("sh", cwd).args(["-c", script])
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout of a successful run, or [`AgentError::CommandFailed`].
    pub fn into_stdout(self, spec: &CommandSpec) -> Result<String, AgentError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(AgentError::CommandFailed {
                command: spec.to_string(),
                code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Trait for executing agent commands. Enables mock injection for testing.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, AgentError>;
}

/// Real runner using `tokio::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill and fail commands that run longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, AgentError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        tracing::debug!(command = %spec, cwd = %spec.cwd.display(), "running agent command");

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, cmd.output())
                .await
                .map_err(|_| AgentError::Timeout {
                    command: spec.to_string(),
                    timeout,
                })?,
            None => cmd.output().await,
        }
        .map_err(|source| AgentError::Spawn {
            command: spec.to_string(),
            source,
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
