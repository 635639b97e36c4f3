//! Scripted agent and resolver shared by the watcher tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use appmap_agent::{
    AgentError, AgentResolver, AppMapAgent, ConfigurationFile, FilesResponse, InitResponse,
    InstallResult, LanguageDistribution, Resolution,
};
use appmap_core::StatusSnapshot;
use async_trait::async_trait;
use serde_json::json;

pub fn config_status(present: bool, valid: bool) -> StatusSnapshot {
    StatusSnapshot::new(json!({
        "properties": { "config": { "present": present, "valid": valid } }
    }))
}

type ScriptedStatus = Result<Option<StatusSnapshot>, &'static str>;

struct Script {
    installed: bool,
    fail_is_installed: bool,
    fail_install: bool,
    /// Each queued status is returned once; after that the last one repeats.
    statuses: VecDeque<ScriptedStatus>,
    last: ScriptedStatus,
    status_calls: usize,
    is_installed_calls: usize,
    test_calls: Vec<Option<String>>,
}

pub struct MockAgent {
    language: &'static str,
    script: Mutex<Script>,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::with_language("ruby")
    }

    pub fn with_language(language: &'static str) -> Self {
        Self {
            language,
            script: Mutex::new(Script {
                installed: true,
                fail_is_installed: false,
                fail_install: false,
                statuses: VecDeque::new(),
                last: Ok(None),
                status_calls: 0,
                is_installed_calls: 0,
                test_calls: Vec::new(),
            }),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn set_installed(&self, installed: bool) {
        self.script().installed = installed;
    }

    pub fn fail_is_installed(&self, fail: bool) {
        self.script().fail_is_installed = fail;
    }

    pub fn fail_install(&self, fail: bool) {
        self.script().fail_install = fail;
    }

    pub fn push_status(&self, status: ScriptedStatus) {
        self.script().statuses.push_back(status);
    }

    pub fn status_calls(&self) -> usize {
        self.script().status_calls
    }

    pub fn is_installed_calls(&self) -> usize {
        self.script().is_installed_calls
    }

    pub fn test_calls(&self) -> Vec<Option<String>> {
        self.script().test_calls.clone()
    }
}

fn failure(command: &str, message: &str) -> AgentError {
    AgentError::CommandFailed {
        command: command.to_string(),
        code: 1,
        stderr: message.to_string(),
    }
}

#[async_trait]
impl AppMapAgent for MockAgent {
    fn language(&self) -> &str {
        self.language
    }

    async fn is_installed(&self, _root: &Path) -> Result<bool, AgentError> {
        let mut script = self.script();
        script.is_installed_calls += 1;
        if script.fail_is_installed {
            return Err(failure("is_installed", "probe failed"));
        }
        Ok(script.installed)
    }

    async fn install(&self, _root: &Path) -> Result<InstallResult, AgentError> {
        let mut script = self.script();
        if script.fail_install {
            return Err(failure("install", "install failed"));
        }
        let was_installed = std::mem::replace(&mut script.installed, true);
        Ok(if was_installed {
            InstallResult::Upgraded
        } else {
            InstallResult::Installed
        })
    }

    async fn init(&self, _root: &Path) -> Result<InitResponse, AgentError> {
        Ok(InitResponse {
            configuration: ConfigurationFile {
                filename: "appmap.yml".into(),
                contents: "name: project\n".into(),
            },
        })
    }

    async fn files(&self, _root: &Path) -> Result<FilesResponse, AgentError> {
        Ok(FilesResponse::default())
    }

    async fn status(&self, _root: &Path) -> Result<Option<StatusSnapshot>, AgentError> {
        let mut script = self.script();
        script.status_calls += 1;
        if let Some(next) = script.statuses.pop_front() {
            script.last = next;
        }
        script.last.clone().map_err(|message| failure("status", message))
    }

    async fn test(&self, _root: &Path, command: Option<&str>) -> Result<(), AgentError> {
        self.script().test_calls.push(command.map(str::to_string));
        Ok(())
    }
}

/// Resolves every root to one language and (optionally) one agent.
pub struct FixedResolver {
    language: String,
    primary: Option<Arc<dyn AppMapAgent>>,
    agents: HashMap<String, Arc<dyn AppMapAgent>>,
}

impl FixedResolver {
    pub fn new(language: &str, agent: Option<Arc<MockAgent>>) -> Self {
        let primary = agent.map(|a| a as Arc<dyn AppMapAgent>);
        let mut agents = HashMap::new();
        if let Some(agent) = &primary {
            agents.insert(language.to_string(), Arc::clone(agent));
        }
        Self {
            language: language.to_string(),
            primary,
            agents,
        }
    }

    pub fn with_agent(mut self, agent: Arc<MockAgent>) -> Self {
        self.agents.insert(agent.language().to_string(), agent);
        self
    }
}

#[async_trait]
impl AgentResolver for FixedResolver {
    async fn resolve(&self, _root: &Path) -> Result<Resolution, AgentError> {
        Ok(Resolution {
            language: self.language.clone(),
            distribution: LanguageDistribution::from_counts(BTreeMap::from([(
                self.language.clone(),
                1,
            )])),
            agent: self.primary.clone(),
        })
    }

    fn agent_for_language(&self, language: &str) -> Option<Arc<dyn AppMapAgent>> {
        self.agents.get(language).cloned()
    }
}
