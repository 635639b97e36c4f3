//! Onboarding milestones: install → configure → record → view.
//!
//! A [`Milestone`] is a named completion tracker. State only changes through
//! [`Milestone::set_state`], which is a no-op when the state is unchanged, so
//! listeners never see redundant notifications.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{EventEmitter, Subscription};
use crate::telemetry::{Telemetry, TelemetryEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneId {
    InstallAgent,
    CreateConfiguration,
    RecordAppmap,
    ViewAppmap,
}

impl MilestoneId {
    /// All milestones in onboarding order.
    pub const ALL: [MilestoneId; 4] = [
        MilestoneId::InstallAgent,
        MilestoneId::CreateConfiguration,
        MilestoneId::RecordAppmap,
        MilestoneId::ViewAppmap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MilestoneId::InstallAgent => "INSTALL_AGENT",
            MilestoneId::CreateConfiguration => "CREATE_CONFIGURATION",
            MilestoneId::RecordAppmap => "RECORD_APPMAP",
            MilestoneId::ViewAppmap => "VIEW_APPMAP",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MilestoneId::InstallAgent => "Install AppMap agent",
            MilestoneId::CreateConfiguration => "Configure AppMap",
            MilestoneId::RecordAppmap => "Record AppMaps",
            MilestoneId::ViewAppmap => "Open an AppMap",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MilestoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MilestoneId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        MilestoneId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| format!("unknown milestone `{s}`"))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionState {
    #[default]
    Incomplete,
    Complete,
    Error,
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompletionState::Incomplete => "incomplete",
            CompletionState::Complete => "complete",
            CompletionState::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: CompletionState,
    updated_at: Option<DateTime<Utc>>,
}

pub struct Milestone {
    id: MilestoneId,
    root: PathBuf,
    tracked: Mutex<Tracked>,
    on_change_state: EventEmitter<Milestone>,
    telemetry: Arc<dyn Telemetry>,
}

impl Milestone {
    pub fn new(id: MilestoneId, root: impl Into<PathBuf>, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            id,
            root: root.into(),
            tracked: Mutex::new(Tracked {
                state: CompletionState::Incomplete,
                updated_at: None,
            }),
            on_change_state: EventEmitter::new(),
            telemetry,
        }
    }

    pub fn id(&self) -> MilestoneId {
        self.id
    }

    pub fn label(&self) -> &'static str {
        self.id.label()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> CompletionState {
        self.tracked().state
    }

    /// When the state last changed; `None` while still at its initial state.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.tracked().updated_at
    }

    /// Move to `state`, notifying listeners and telemetry. Returns `false`
    /// (and does nothing) when the milestone is already in `state`.
    pub fn set_state(&self, state: CompletionState) -> bool {
        {
            let mut tracked = self.tracked.lock().unwrap_or_else(|p| p.into_inner());
            if tracked.state == state {
                return false;
            }
            tracked.state = state;
            tracked.updated_at = Some(Utc::now());
        }

        self.on_change_state.fire(self);
        self.telemetry.send(TelemetryEvent::MilestoneChangeState {
            root: self.root.clone(),
            milestone: self.id,
            state,
        });
        true
    }

    /// Listen for state changes. The listener receives the milestone itself.
    pub fn on_change_state(
        &self,
        listener: impl Fn(&Milestone) + Send + Sync + 'static,
    ) -> Subscription {
        self.on_change_state.subscribe(listener)
    }

    fn tracked(&self) -> Tracked {
        *self.tracked.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl fmt::Debug for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Milestone")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Serializable view of one milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneSnapshot {
    pub id: MilestoneId,
    pub label: String,
    pub state: CompletionState,
}

/// The fixed set of milestones for one project, one per [`MilestoneId`].
pub struct MilestoneMap {
    milestones: [Milestone; 4],
}

impl MilestoneMap {
    pub fn new(root: &Path, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            milestones: MilestoneId::ALL.map(|id| Milestone::new(id, root, Arc::clone(&telemetry))),
        }
    }

    pub fn get(&self, id: MilestoneId) -> &Milestone {
        &self.milestones[id.index()]
    }

    /// Shorthand for `get(id).set_state(state)`.
    pub fn set(&self, id: MilestoneId, state: CompletionState) -> bool {
        self.get(id).set_state(state)
    }

    pub fn state(&self, id: MilestoneId) -> CompletionState {
        self.get(id).state()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Milestone> {
        self.milestones.iter()
    }

    pub fn snapshot(&self) -> Vec<MilestoneSnapshot> {
        self.iter()
            .map(|m| MilestoneSnapshot {
                id: m.id(),
                label: m.label().to_string(),
                state: m.state(),
            })
            .collect()
    }

    /// First milestone, in onboarding order, that is not complete.
    pub fn next_incomplete(&self) -> Option<&Milestone> {
        self.iter().find(|m| m.state() != CompletionState::Complete)
    }

    pub fn all_complete(&self) -> bool {
        self.next_incomplete().is_none()
    }
}

impl fmt::Debug for MilestoneMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.milestones.iter()).finish()
    }
}
