//! appmap-agent: the subprocess boundary between the project watcher and the
//! per-language AppMap CLIs.

pub mod agent;
pub mod error;
pub mod executor;
pub mod language;
pub mod python;
pub mod registry;
pub mod ruby;

pub use agent::{AppMapAgent, ConfigurationFile, FilesResponse, InitResponse, InstallResult};
pub use error::AgentError;
pub use executor::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use language::{LANGUAGES, LanguageDistribution, LanguageResolver, UNKNOWN_LANGUAGE};
pub use python::PythonAgent;
pub use registry::{AgentRegistry, AgentResolver, Resolution};
pub use ruby::RubyAgent;
