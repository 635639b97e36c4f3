//! Telemetry vocabulary. Delivery is up to the embedder: the watcher crate
//! ships a `tracing` sink, tests use [`RecordingTelemetry`].

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use crate::milestone::{CompletionState, MilestoneId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    MilestoneChangeState {
        root: PathBuf,
        milestone: MilestoneId,
        state: CompletionState,
    },
    /// `properties.config.present` flipped between two polls.
    ProjectConfigWrite { root: PathBuf, present: bool },
    /// The watcher left the steady polling state (agent no longer usable).
    AgentRemoved { root: PathBuf },
    /// A scheduled poll failed; the loop carries on.
    TickFailed { root: PathBuf, error: String },
    MilestoneAction {
        root: PathBuf,
        milestone: MilestoneId,
        success: bool,
    },
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::MilestoneChangeState { .. } => "milestone:change_state",
            TelemetryEvent::ProjectConfigWrite { .. } => "project:config_write",
            TelemetryEvent::AgentRemoved { .. } => "agent:removed",
            TelemetryEvent::TickFailed { .. } => "debug:exception",
            TelemetryEvent::MilestoneAction { .. } => "milestone:action",
        }
    }
}

pub trait Telemetry: Send + Sync {
    fn send(&self, event: TelemetryEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn send(&self, _event: TelemetryEvent) {}
}

/// Keeps every event in memory, in delivery order.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

impl Telemetry for RecordingTelemetry {
    fn send(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}
