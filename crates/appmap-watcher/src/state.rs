//! The two project watcher states and their enter/exit/tick behaviour.
//!
//! `WaitForAgentInstall` is the initial state: the agent has not been seen
//! yet. Once it is installed and reports a status the watcher moves to
//! `WatchProjectStatus`, the steady polling state, and falls back if the
//! agent disappears.
//!
//! Record/view completion is re-checked on every tick from persistent
//! flags. Configuration validity is only acted on when it changes between
//! two polls, because its transitions reset downstream milestones.

use std::fmt;
use std::path::{Path, PathBuf};

use appmap_agent::{AgentError, AppMapAgent};
use appmap_core::status::{CONFIG_PRESENT, CONFIG_VALID};
use appmap_core::{
    CompletionState, EventEmitter, MilestoneId, MilestoneMap, ObjectKeyDiff, StatusSnapshot,
    Subscription, Telemetry, TelemetryEvent,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::artifacts::ProjectArtifacts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatcherState {
    WaitForAgentInstall,
    WatchProjectStatus,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WatcherState::WaitForAgentInstall => "WAIT_FOR_AGENT_INSTALL",
            WatcherState::WatchProjectStatus => "WATCH_PROJECT_STATUS",
        })
    }
}

/// Read-only view of the project a state operates on.
pub struct ProjectContext<'a> {
    pub root: &'a Path,
    pub milestones: &'a MilestoneMap,
    pub artifacts: &'a ProjectArtifacts,
    pub telemetry: &'a dyn Telemetry,
}

/// Signals raised by state-owned listeners, handled by the watcher after the
/// event that triggered them has been delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    AppMapCreated(PathBuf),
}

/// Per-state listener handles. At most one "AppMap created" listener is
/// registered at a time; it is owned here so that leaving the state (or
/// disposing the watcher) detaches it.
pub struct StateHooks {
    appmap_created: EventEmitter<PathBuf>,
    listener: Option<Subscription>,
    loopback: mpsc::UnboundedSender<HookEvent>,
}

impl StateHooks {
    pub fn new(appmap_created: EventEmitter<PathBuf>) -> (Self, mpsc::UnboundedReceiver<HookEvent>) {
        let (loopback, rx) = mpsc::unbounded_channel();
        let hooks = Self {
            appmap_created,
            listener: None,
            loopback,
        };
        (hooks, rx)
    }

    pub fn has_appmap_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Detach the "AppMap created" listener. Returns whether one was attached.
    pub fn take_appmap_listener(&mut self) -> bool {
        self.listener.take().is_some()
    }

    fn listen_for_appmap(&mut self) {
        if self.listener.is_some() {
            return;
        }
        let loopback = self.loopback.clone();
        self.listener = Some(self.appmap_created.subscribe(move |path: &PathBuf| {
            let _ = loopback.send(HookEvent::AppMapCreated(path.clone()));
        }));
    }
}

/// Result of one tick: the status to remember for the next diff (if any) and
/// the state to move to (if any).
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub status: Option<StatusSnapshot>,
    pub transition: Option<WatcherState>,
}

impl TickOutcome {
    fn stay(status: Option<StatusSnapshot>) -> Self {
        Self {
            status,
            transition: None,
        }
    }

    fn to(state: WatcherState, status: Option<StatusSnapshot>) -> Self {
        Self {
            status,
            transition: Some(state),
        }
    }
}

impl WatcherState {
    pub fn on_enter(self, ctx: &ProjectContext<'_>, hooks: &mut StateHooks) {
        match self {
            WatcherState::WaitForAgentInstall => {
                ctx.milestones
                    .set(MilestoneId::InstallAgent, CompletionState::Incomplete);
            }
            WatcherState::WatchProjectStatus => {
                if !ctx.artifacts.has_appmap() {
                    hooks.listen_for_appmap();
                }
            }
        }
    }

    pub fn on_exit(self, ctx: &ProjectContext<'_>, hooks: &mut StateHooks) {
        match self {
            WatcherState::WaitForAgentInstall => {
                let m = ctx.milestones;
                m.set(MilestoneId::InstallAgent, CompletionState::Complete);
                m.set(MilestoneId::RecordAppmap, CompletionState::Incomplete);
                m.set(MilestoneId::ViewAppmap, CompletionState::Incomplete);
            }
            WatcherState::WatchProjectStatus => {
                hooks.take_appmap_listener();
                ctx.telemetry.send(TelemetryEvent::AgentRemoved {
                    root: ctx.root.to_path_buf(),
                });
            }
        }
    }

    /// Run one poll. Agent failures other than the ones a state turns into
    /// milestone errors are returned to the caller.
    pub async fn tick(
        self,
        ctx: &ProjectContext<'_>,
        agent: &dyn AppMapAgent,
        last_status: Option<&StatusSnapshot>,
    ) -> Result<TickOutcome, AgentError> {
        match self {
            WatcherState::WaitForAgentInstall => wait_for_agent_install(ctx, agent).await,
            WatcherState::WatchProjectStatus => watch_project_status(ctx, agent, last_status).await,
        }
    }
}

async fn wait_for_agent_install(
    ctx: &ProjectContext<'_>,
    agent: &dyn AppMapAgent,
) -> Result<TickOutcome, AgentError> {
    if !agent.is_installed(ctx.root).await? {
        return Ok(TickOutcome::stay(None));
    }

    let status = match agent.status(ctx.root).await {
        Ok(Some(status)) => status,
        Ok(None) => {
            tracing::warn!(root = %ctx.root.display(), "agent is installed but reported no status");
            ctx.milestones
                .set(MilestoneId::InstallAgent, CompletionState::Error);
            return Ok(TickOutcome::stay(None));
        }
        Err(e) => {
            tracing::warn!(root = %ctx.root.display(), "agent is installed but unusable: {e}");
            ctx.milestones
                .set(MilestoneId::InstallAgent, CompletionState::Error);
            return Ok(TickOutcome::stay(None));
        }
    };

    if status.config_present() {
        let state = if status.config_valid() {
            CompletionState::Complete
        } else {
            CompletionState::Error
        };
        ctx.milestones.set(MilestoneId::CreateConfiguration, state);
    }

    Ok(TickOutcome::to(WatcherState::WatchProjectStatus, Some(status)))
}

async fn watch_project_status(
    ctx: &ProjectContext<'_>,
    agent: &dyn AppMapAgent,
    last_status: Option<&StatusSnapshot>,
) -> Result<TickOutcome, AgentError> {
    if !agent.is_installed(ctx.root).await? {
        tracing::info!(root = %ctx.root.display(), "agent was uninstalled");
        return Ok(TickOutcome::to(WatcherState::WaitForAgentInstall, None));
    }

    let Some(status) = agent.status(ctx.root).await? else {
        return Ok(TickOutcome::to(WatcherState::WaitForAgentInstall, None));
    };

    let milestones = ctx.milestones;
    ObjectKeyDiff::new(last_status.map(StatusSnapshot::raw), status.raw())
        .on(CONFIG_PRESENT, |present, _| {
            let present = present == Some(&Value::Bool(true));
            ctx.telemetry.send(TelemetryEvent::ProjectConfigWrite {
                root: ctx.root.to_path_buf(),
                present,
            });
            if !present {
                milestones.set(MilestoneId::CreateConfiguration, CompletionState::Incomplete);
            }
        })
        .on(CONFIG_VALID, |valid, _| {
            if valid == Some(&Value::Bool(true)) {
                milestones.set(MilestoneId::CreateConfiguration, CompletionState::Complete);
                milestones.set(MilestoneId::RecordAppmap, CompletionState::Incomplete);
                milestones.set(MilestoneId::ViewAppmap, CompletionState::Incomplete);
            } else if status.config_present() {
                milestones.set(MilestoneId::CreateConfiguration, CompletionState::Error);
            }
        });

    if ctx.artifacts.has_appmap() {
        milestones.set(MilestoneId::RecordAppmap, CompletionState::Complete);
    }
    if ctx.artifacts.appmap_opened() {
        milestones.set(MilestoneId::ViewAppmap, CompletionState::Complete);
    }

    Ok(TickOutcome::stay(Some(status)))
}
