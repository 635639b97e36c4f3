//! Language → agent binding.
//!
//! The registry owns one agent per supported language and a shared
//! [`LanguageResolver`]. Resolving a project root detects its language and
//! returns the matching agent, if one is registered.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::AppMapAgent;
use crate::error::AgentError;
use crate::executor::CommandRunner;
use crate::language::{LanguageDistribution, LanguageResolver};
use crate::python::PythonAgent;
use crate::ruby::RubyAgent;

// ─── Resolution ─────────────────────────────────────────────────────

/// Outcome of resolving a project root.
#[derive(Clone)]
pub struct Resolution {
    pub language: String,
    pub distribution: LanguageDistribution,
    pub agent: Option<Arc<dyn AppMapAgent>>,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("language", &self.language)
            .field("distribution", &self.distribution)
            .field("agent", &self.agent.as_ref().map(|a| a.language().to_string()))
            .finish()
    }
}

/// Binds project roots (and explicit language overrides) to agents.
#[async_trait]
pub trait AgentResolver: Send + Sync {
    async fn resolve(&self, root: &Path) -> Result<Resolution, AgentError>;

    fn agent_for_language(&self, language: &str) -> Option<Arc<dyn AppMapAgent>>;
}

// ─── Agent Registry ─────────────────────────────────────────────────

pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn AppMapAgent>>,
    languages: LanguageResolver,
}

impl AgentRegistry {
    pub fn new(languages: LanguageResolver) -> Self {
        Self {
            agents: HashMap::new(),
            languages,
        }
    }

    /// Registry with the Ruby and Python agents sharing `runner`.
    pub fn with_default_agents(runner: Arc<dyn CommandRunner>) -> Self {
        let mut registry = Self::new(LanguageResolver::new());
        registry.register(Arc::new(RubyAgent::new(runner.clone())));
        registry.register(Arc::new(PythonAgent::new(runner)));
        registry
    }

    /// Register `agent` under its own language id, replacing any previous one.
    pub fn register(&mut self, agent: Arc<dyn AppMapAgent>) {
        self.agents.insert(agent.language().to_string(), agent);
    }

    pub fn languages(&self) -> &LanguageResolver {
        &self.languages
    }

    pub fn supported_languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }

    pub fn require_agent(&self, language: &str) -> Result<Arc<dyn AppMapAgent>, AgentError> {
        self.agent_for_language(language)
            .ok_or_else(|| AgentError::UnsupportedLanguage(language.to_string()))
    }
}

#[async_trait]
impl AgentResolver for AgentRegistry {
    async fn resolve(&self, root: &Path) -> Result<Resolution, AgentError> {
        let languages = self.languages.clone();
        let owned_root = root.to_path_buf();
        let distribution = tokio::task::spawn_blocking(move || languages.distribution(&owned_root))
            .await
            .map_err(|e| AgentError::Io(std::io::Error::other(e)))??;

        let language = distribution.best_fit().to_string();
        let agent = self.agent_for_language(&language);
        tracing::debug!(
            root = %root.display(),
            %language,
            bound = agent.is_some(),
            "resolved project language"
        );
        Ok(Resolution {
            language,
            distribution,
            agent,
        })
    }

    fn agent_for_language(&self, language: &str) -> Option<Arc<dyn AppMapAgent>> {
        self.agents.get(language).cloned()
    }
}
