//! Agent status snapshots.
//!
//! The snapshot is kept as raw JSON so that successive polls can be diffed
//! path by path; typed accessors cover the handful of fields the watcher
//! reacts to.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::key_diff::resolve_key;

pub const CONFIG_PRESENT: &str = "properties.config.present";
pub const CONFIG_VALID: &str = "properties.config.valid";

/// One test command advertised by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCommand {
    pub command: String,
    #[serde(default, alias = "workingDirectory", skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot(Value);

impl StatusSnapshot {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        resolve_key(key, &self.0)
    }

    pub fn config_present(&self) -> bool {
        self.flag(CONFIG_PRESENT)
    }

    pub fn config_valid(&self) -> bool {
        self.flag(CONFIG_VALID)
    }

    pub fn config_app(&self) -> Option<&str> {
        self.get("properties.config.app").and_then(Value::as_str)
    }

    pub fn agent_version(&self) -> Option<&str> {
        self.get("properties.project.agentVersion")
            .and_then(Value::as_str)
    }

    pub fn language(&self) -> Option<&str> {
        self.get("properties.project.language").and_then(Value::as_str)
    }

    /// Test commands, accepting both `test_commands` and the older
    /// `commands` key. Entries that fail to parse are skipped.
    pub fn test_commands(&self) -> Vec<StatusCommand> {
        let list = self
            .get("test_commands")
            .or_else(|| self.get("commands"))
            .and_then(Value::as_array);

        list.into_iter()
            .flatten()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect()
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

impl From<Value> for StatusSnapshot {
    fn from(raw: Value) -> Self {
        Self(raw)
    }
}
