use appmap_agent::{AgentError, LanguageDistribution};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("project watcher is already initialized")]
    AlreadyInitialized,

    #[error("project watcher has been disposed")]
    Disposed,

    /// No agent supports the detected project language.
    #[error("no AppMap agent supports `{language}` (detected languages: {distribution})")]
    NoAgent {
        language: String,
        distribution: LanguageDistribution,
    },

    #[error("no AppMap agent is available for language `{0}`")]
    NoAgentForLanguage(String),

    #[error("no agent is bound to this project")]
    NotBound,

    /// The agent asked for a configuration file that would land outside the
    /// project root.
    #[error("refusing to write configuration `{0}` outside the project root")]
    ConfigOutsideProject(String),

    #[error("no project watcher is running for {}", .0.display())]
    UnknownProject(std::path::PathBuf),

    #[error("project watcher task is no longer running")]
    Closed,

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("watcher io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file watch error: {0}")]
    Notify(#[from] notify::Error),
}
