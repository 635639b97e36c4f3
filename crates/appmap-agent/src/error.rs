//! Error types for the agent boundary.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("failed to parse output of `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("language `{0}` is not supported")]
    UnsupportedLanguage(String),

    #[error("agent io error: {0}")]
    Io(#[from] std::io::Error),
}
