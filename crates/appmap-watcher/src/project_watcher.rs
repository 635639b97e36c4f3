//! Per-project state machine driver.
//!
//! A `ProjectWatcher` owns the milestones of one workspace folder, the
//! current [`WatcherState`], the last observed status and the deadline of the
//! next scheduled poll. It is driven by a single task (see [`crate::driver`]),
//! so ticks never overlap: a tick clears the deadline before it runs and only
//! [`ProjectWatcher::queue_next_tick`] re-arms it.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use appmap_agent::{AgentResolver, AppMapAgent, ConfigurationFile};
use appmap_core::{
    CompletionState, EventEmitter, MilestoneId, MilestoneMap, StatusCommand, StatusSnapshot,
    Subscription, Telemetry, TelemetryEvent,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::artifacts::ProjectArtifacts;
use crate::config::WatcherConfig;
use crate::error::WatcherError;
use crate::state::{HookEvent, ProjectContext, StateHooks, WatcherState};

const APPMAP_YML: &str = "appmap.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Disposed,
}

struct Binding {
    language: String,
    agent: Arc<dyn AppMapAgent>,
}

pub struct ProjectWatcher {
    root: PathBuf,
    config: WatcherConfig,
    milestones: Arc<MilestoneMap>,
    artifacts: Arc<ProjectArtifacts>,
    telemetry: Arc<dyn Telemetry>,
    resolver: Arc<dyn AgentResolver>,
    binding: Option<Binding>,
    /// Language of the current binding, readable from handles.
    language: Arc<RwLock<Option<String>>>,
    state: WatcherState,
    last_status: Option<StatusSnapshot>,
    next_tick_at: Option<Instant>,
    lifecycle: Lifecycle,
    appmap_created: EventEmitter<PathBuf>,
    hooks: StateHooks,
    hook_rx: mpsc::UnboundedReceiver<HookEvent>,
    cancel: CancellationToken,
}

impl ProjectWatcher {
    pub fn new(
        root: impl Into<PathBuf>,
        resolver: Arc<dyn AgentResolver>,
        telemetry: Arc<dyn Telemetry>,
        config: WatcherConfig,
    ) -> Self {
        let root = root.into();
        let appmap_created = EventEmitter::new();
        let (hooks, hook_rx) = StateHooks::new(appmap_created.clone());
        let mut watcher = Self {
            milestones: Arc::new(MilestoneMap::new(&root, Arc::clone(&telemetry))),
            root,
            config,
            artifacts: Arc::new(ProjectArtifacts::default()),
            telemetry,
            resolver,
            binding: None,
            language: Arc::new(RwLock::new(None)),
            state: WatcherState::WaitForAgentInstall,
            last_status: None,
            next_tick_at: None,
            lifecycle: Lifecycle::Uninitialized,
            appmap_created,
            hooks,
            hook_rx,
            cancel: CancellationToken::new(),
        };
        let ctx = ProjectContext {
            root: &watcher.root,
            milestones: &watcher.milestones,
            artifacts: &watcher.artifacts,
            telemetry: watcher.telemetry.as_ref(),
        };
        watcher.state.on_enter(&ctx, &mut watcher.hooks);
        watcher
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn milestones(&self) -> &Arc<MilestoneMap> {
        &self.milestones
    }

    pub fn artifacts(&self) -> &Arc<ProjectArtifacts> {
        &self.artifacts
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn last_status(&self) -> Option<&StatusSnapshot> {
        self.last_status.as_ref()
    }

    /// When the next scheduled tick is due, if one is pending.
    pub fn next_tick_at(&self) -> Option<Instant> {
        self.next_tick_at
    }

    pub fn language(&self) -> Option<String> {
        self.binding.as_ref().map(|b| b.language.clone())
    }

    pub(crate) fn shared_language(&self) -> Arc<RwLock<Option<String>>> {
        Arc::clone(&self.language)
    }

    pub(crate) fn appmap_created_emitter(&self) -> EventEmitter<PathBuf> {
        self.appmap_created.clone()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn on_appmap_created(
        &self,
        listener: impl Fn(&PathBuf) + Send + Sync + 'static,
    ) -> Subscription {
        self.appmap_created.subscribe(listener)
    }

    /// Test commands advertised by the last status snapshot.
    pub fn test_commands(&self) -> Vec<StatusCommand> {
        self.last_status
            .as_ref()
            .map(StatusSnapshot::test_commands)
            .unwrap_or_default()
    }

    pub async fn appmap_yml(&self) -> Result<Option<String>, WatcherError> {
        read_appmap_yml(&self.root).await
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Bind the project to an agent and run the first tick.
    ///
    /// Fails if called twice, after disposal, or when no agent supports the
    /// detected language. Detection is skipped when [`set_language`] already
    /// bound an agent. A failed call leaves the watcher uninitialized.
    ///
    /// [`set_language`]: ProjectWatcher::set_language
    pub async fn initialize(&mut self) -> Result<(), WatcherError> {
        match self.lifecycle {
            Lifecycle::Initialized => return Err(WatcherError::AlreadyInitialized),
            Lifecycle::Disposed => return Err(WatcherError::Disposed),
            Lifecycle::Uninitialized => {}
        }

        // A language chosen through `set_language` beforehand wins over detection.
        if self.binding.is_none() {
            let resolution = self.resolver.resolve(&self.root).await?;
            let Some(agent) = resolution.agent else {
                return Err(WatcherError::NoAgent {
                    language: resolution.language,
                    distribution: resolution.distribution,
                });
            };
            self.bind(resolution.language, agent);
        }

        let root = self.root.clone();
        let artifacts = Arc::clone(&self.artifacts);
        let pattern = self.config.appmap_pattern();
        let found = tokio::task::spawn_blocking(move || artifacts.scan(&root, &pattern))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("AppMap scan task failed: {e}");
                false
            });

        self.lifecycle = Lifecycle::Initialized;
        tracing::info!(
            root = %self.root.display(),
            language = %self.language().unwrap_or_default(),
            has_appmap = found,
            "project watcher initialized"
        );

        self.tick().await;
        Ok(())
    }

    /// Stop polling and detach listeners. An in-flight tick still completes
    /// but does not schedule another one.
    pub fn dispose(&mut self) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        self.lifecycle = Lifecycle::Disposed;
        self.next_tick_at = None;
        self.hooks.take_appmap_listener();
        self.cancel.cancel();
        tracing::debug!(root = %self.root.display(), "project watcher disposed");
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Run the current state's tick. Failures are reported to telemetry and
    /// never escape; the next tick is always queued.
    pub async fn tick(&mut self) {
        self.next_tick_at = None;

        let status = match self.run_state_tick().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), state = %self.state, "tick failed: {e}");
                self.telemetry.send(TelemetryEvent::TickFailed {
                    root: self.root.clone(),
                    error: e.to_string(),
                });
                None
            }
        };

        self.queue_next_tick(status);
    }

    async fn run_state_tick(&mut self) -> Result<Option<StatusSnapshot>, WatcherError> {
        let agent = match &self.binding {
            Some(binding) => Arc::clone(&binding.agent),
            None => return Err(WatcherError::NotBound),
        };

        let ctx = ProjectContext {
            root: &self.root,
            milestones: &self.milestones,
            artifacts: &self.artifacts,
            telemetry: self.telemetry.as_ref(),
        };
        let outcome = self
            .state
            .tick(&ctx, agent.as_ref(), self.last_status.as_ref())
            .await?;

        if let Some(next) = outcome.transition {
            self.set_state(next);
        }
        Ok(outcome.status)
    }

    /// Remember `status` (if any) for the next diff and arm the timer, unless
    /// the watcher has been disposed.
    pub fn queue_next_tick(&mut self, status: Option<StatusSnapshot>) {
        if let Some(status) = status {
            self.last_status = Some(status);
        }

        if self.lifecycle == Lifecycle::Disposed || self.cancel.is_cancelled() {
            self.next_tick_at = None;
            return;
        }
        self.next_tick_at = Some(Instant::now() + self.config.frequency);
    }

    /// Cancel the pending timer and tick now.
    pub async fn force_next_tick(&mut self) {
        if self.lifecycle != Lifecycle::Initialized {
            tracing::debug!(root = %self.root.display(), lifecycle = ?self.lifecycle, "ignoring forced tick");
            return;
        }
        self.next_tick_at = None;
        self.tick().await;
    }

    /// Exit the current state, then enter `next`.
    pub fn set_state(&mut self, next: WatcherState) {
        tracing::info!(root = %self.root.display(), from = %self.state, to = %next, "state transition");
        let ctx = ProjectContext {
            root: &self.root,
            milestones: &self.milestones,
            artifacts: &self.artifacts,
            telemetry: self.telemetry.as_ref(),
        };
        self.state.on_exit(&ctx, &mut self.hooks);
        self.state = next;
        self.state.on_enter(&ctx, &mut self.hooks);
    }

    // ── External events ──────────────────────────────────────────────

    /// An AppMap file was written under the project root.
    pub async fn notify_appmap_created(&mut self, path: PathBuf) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        if self.artifacts.record_appmap() {
            tracing::info!(root = %self.root.display(), path = %path.display(), "first AppMap recorded");
        }
        self.appmap_created.fire(&path);
        self.process_hook_events().await;
    }

    /// An AppMap of this project was opened by the user.
    pub fn mark_appmap_opened(&mut self) {
        if self.artifacts.record_opened() {
            tracing::info!(root = %self.root.display(), "first AppMap opened");
        }
    }

    async fn process_hook_events(&mut self) {
        while let Ok(event) = self.hook_rx.try_recv() {
            match event {
                HookEvent::AppMapCreated(path) => {
                    // One-shot: only the first event after entering the state counts.
                    if !self.hooks.take_appmap_listener() {
                        continue;
                    }
                    tracing::debug!(path = %path.display(), "AppMap created; forcing tick");
                    self.milestones
                        .set(MilestoneId::RecordAppmap, CompletionState::Complete);
                    self.force_next_tick().await;
                }
            }
        }
    }

    // ── User actions ─────────────────────────────────────────────────

    /// Carry out the user-facing action behind milestone `id`, then re-poll.
    ///
    /// `data` may carry `{"command": "..."}` for `RECORD_APPMAP`. Errors are
    /// returned to the caller and do not affect the polling loop.
    pub async fn perform_milestone_action(
        &mut self,
        id: MilestoneId,
        data: Option<&Value>,
    ) -> Result<(), WatcherError> {
        if self.lifecycle == Lifecycle::Disposed {
            return Err(WatcherError::Disposed);
        }
        let agent = match &self.binding {
            Some(binding) => Arc::clone(&binding.agent),
            None => return Err(WatcherError::NotBound),
        };

        tracing::info!(root = %self.root.display(), milestone = %id, "performing milestone action");
        let result = self.run_action(agent.as_ref(), id, data).await;
        self.telemetry.send(TelemetryEvent::MilestoneAction {
            root: self.root.clone(),
            milestone: id,
            success: result.is_ok(),
        });
        result?;

        self.force_next_tick().await;
        Ok(())
    }

    async fn run_action(
        &mut self,
        agent: &dyn AppMapAgent,
        id: MilestoneId,
        data: Option<&Value>,
    ) -> Result<(), WatcherError> {
        match id {
            MilestoneId::InstallAgent => {
                let result = agent.install(&self.root).await?;
                tracing::info!(root = %self.root.display(), ?result, "agent install finished");
            }
            MilestoneId::CreateConfiguration => {
                let init = agent.init(&self.root).await?;
                write_configuration(&self.root, &init.configuration).await?;
            }
            MilestoneId::RecordAppmap => {
                let command = data
                    .and_then(|d| d.get("command"))
                    .and_then(Value::as_str);
                agent.test(&self.root, command).await?;
            }
            MilestoneId::ViewAppmap => self.mark_appmap_opened(),
        }
        Ok(())
    }

    /// Override the detected language and rebind the agent. The watcher
    /// restarts from the install check with the new agent. Called before
    /// `initialize`, it replaces language detection altogether.
    pub async fn set_language(&mut self, language: &str) -> Result<(), WatcherError> {
        if self.lifecycle == Lifecycle::Disposed {
            return Err(WatcherError::Disposed);
        }
        let agent = self
            .resolver
            .agent_for_language(language)
            .ok_or_else(|| WatcherError::NoAgentForLanguage(language.to_string()))?;

        self.bind(language.to_string(), agent);
        self.last_status = None;
        if self.state != WatcherState::WaitForAgentInstall {
            self.set_state(WatcherState::WaitForAgentInstall);
        }
        self.force_next_tick().await;
        Ok(())
    }

    fn bind(&mut self, language: String, agent: Arc<dyn AppMapAgent>) {
        *self.language.write().unwrap_or_else(|p| p.into_inner()) = Some(language.clone());
        self.binding = Some(Binding { language, agent });
    }
}

impl std::fmt::Debug for ProjectWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectWatcher")
            .field("root", &self.root)
            .field("state", &self.state)
            .field("lifecycle", &self.lifecycle)
            .field("language", &self.language())
            .finish()
    }
}

pub(crate) async fn read_appmap_yml(root: &Path) -> Result<Option<String>, WatcherError> {
    match tokio::fs::read_to_string(root.join(APPMAP_YML)).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write the generated configuration under `root`. Returns `false` when the
/// file already holds exactly these contents.
async fn write_configuration(root: &Path, file: &ConfigurationFile) -> Result<bool, WatcherError> {
    let relative = Path::new(&file.filename);
    let contained = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !contained || relative.file_name().is_none() {
        return Err(WatcherError::ConfigOutsideProject(file.filename.clone()));
    }
    let path = root.join(relative);
    if let Ok(existing) = tokio::fs::read_to_string(&path).await {
        if existing == file.contents {
            return Ok(false);
        }
    }
    tokio::fs::write(&path, &file.contents).await?;
    tracing::info!(path = %path.display(), "wrote AppMap configuration");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FixedResolver, MockAgent, config_status};
    use appmap_core::RecordingTelemetry;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        watcher: ProjectWatcher,
        agent: Arc<MockAgent>,
        telemetry: Arc<RecordingTelemetry>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let agent = Arc::new(MockAgent::new());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let watcher = ProjectWatcher::new(
            dir.path(),
            Arc::new(FixedResolver::new("ruby", Some(agent.clone()))),
            telemetry.clone(),
            WatcherConfig::default(),
        );
        Harness {
            watcher,
            agent,
            telemetry,
            _dir: dir,
        }
    }

    fn state(h: &Harness, id: MilestoneId) -> CompletionState {
        h.watcher.milestones().state(id)
    }

    #[tokio::test]
    async fn initialize_twice_fails() {
        let mut h = harness();
        h.agent.set_installed(false);
        h.watcher.initialize().await.unwrap();
        assert_eq!(h.watcher.language().as_deref(), Some("ruby"));
        assert!(matches!(
            h.watcher.initialize().await,
            Err(WatcherError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn initialize_after_dispose_fails() {
        let mut h = harness();
        h.agent.set_installed(false);
        h.watcher.initialize().await.unwrap();
        h.watcher.dispose();
        assert!(matches!(h.watcher.initialize().await, Err(WatcherError::Disposed)));
        assert!(h.watcher.next_tick_at().is_none());
    }

    #[tokio::test]
    async fn initialize_without_agent_reports_distribution() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = ProjectWatcher::new(
            dir.path(),
            Arc::new(FixedResolver::new("go", None)),
            Arc::new(RecordingTelemetry::default()),
            WatcherConfig::default(),
        );

        let err = watcher.initialize().await.unwrap_err();

        assert!(matches!(err, WatcherError::NoAgent { ref language, .. } if language == "go"));
        assert!(err.to_string().contains("go 100.0%"), "{err}");
        assert_eq!(watcher.lifecycle(), Lifecycle::Uninitialized);
        assert!(watcher.next_tick_at().is_none());
    }

    #[tokio::test]
    async fn fresh_project_waits_for_install() {
        let mut h = harness();
        h.agent.set_installed(false);
        h.watcher.initialize().await.unwrap();

        assert_eq!(h.watcher.state(), WatcherState::WaitForAgentInstall);
        assert_eq!(state(&h, MilestoneId::InstallAgent), CompletionState::Incomplete);
        assert!(h.watcher.next_tick_at().is_some());
    }

    #[tokio::test]
    async fn uninstall_returns_to_wait_and_reentry_resets() {
        let mut h = harness();
        h.agent.push_status(Ok(Some(config_status(true, true))));
        h.watcher.initialize().await.unwrap();
        assert_eq!(h.watcher.state(), WatcherState::WatchProjectStatus);
        assert_eq!(state(&h, MilestoneId::InstallAgent), CompletionState::Complete);

        h.watcher.notify_appmap_created(h.watcher.root().join("a.appmap.json")).await;
        h.watcher.mark_appmap_opened();
        h.watcher.tick().await;
        assert_eq!(state(&h, MilestoneId::RecordAppmap), CompletionState::Complete);
        assert_eq!(state(&h, MilestoneId::ViewAppmap), CompletionState::Complete);

        h.agent.set_installed(false);
        h.watcher.tick().await;
        assert_eq!(h.watcher.state(), WatcherState::WaitForAgentInstall);
        assert_eq!(state(&h, MilestoneId::InstallAgent), CompletionState::Incomplete);
        assert_eq!(h.telemetry.count("agent:removed"), 1);

        h.agent.set_installed(true);
        h.watcher.tick().await;
        assert_eq!(h.watcher.state(), WatcherState::WatchProjectStatus);
        assert_eq!(state(&h, MilestoneId::RecordAppmap), CompletionState::Incomplete);
        assert_eq!(state(&h, MilestoneId::ViewAppmap), CompletionState::Incomplete);

        // Recorded and opened AppMaps are persistent facts; the next poll
        // restores both milestones.
        h.watcher.tick().await;
        assert_eq!(state(&h, MilestoneId::RecordAppmap), CompletionState::Complete);
        assert_eq!(state(&h, MilestoneId::ViewAppmap), CompletionState::Complete);
    }

    #[tokio::test]
    async fn tick_failures_are_contained() {
        let mut h = harness();
        h.agent.push_status(Ok(Some(config_status(true, true))));
        h.watcher.initialize().await.unwrap();

        h.agent.push_status(Err("agent crashed"));
        h.watcher.tick().await;

        assert_eq!(h.telemetry.count("debug:exception"), 1);
        assert_eq!(h.watcher.state(), WatcherState::WatchProjectStatus);
        assert!(h.watcher.next_tick_at().is_some());
        assert!(h.watcher.last_status().is_some());
    }

    #[tokio::test]
    async fn is_installed_errors_are_contained() {
        let mut h = harness();
        h.agent.fail_is_installed(true);
        h.watcher.initialize().await.unwrap();
        assert_eq!(h.telemetry.count("debug:exception"), 1);
        assert!(h.watcher.next_tick_at().is_some());
    }

    #[tokio::test]
    async fn disposed_watcher_does_not_reschedule() {
        let mut h = harness();
        h.agent.set_installed(false);
        h.watcher.initialize().await.unwrap();
        h.watcher.dispose();
        h.watcher.queue_next_tick(None);
        assert!(h.watcher.next_tick_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn queue_next_tick_uses_frequency() {
        let mut h = harness();
        h.agent.set_installed(false);
        h.watcher.initialize().await.unwrap();
        let due = h.watcher.next_tick_at().unwrap();
        assert_eq!(due - Instant::now(), Duration::from_millis(6000));
    }

    #[tokio::test]
    async fn appmap_created_forces_one_tick() {
        let mut h = harness();
        h.agent.push_status(Ok(Some(config_status(true, true))));
        h.watcher.initialize().await.unwrap();
        let calls = h.agent.status_calls();

        let root = h.watcher.root().to_path_buf();
        h.watcher.notify_appmap_created(root.join("a.appmap.json")).await;
        assert_eq!(state(&h, MilestoneId::RecordAppmap), CompletionState::Complete);
        assert_eq!(h.agent.status_calls(), calls + 1);

        // The listener is one-shot.
        h.watcher.notify_appmap_created(root.join("b.appmap.json")).await;
        assert_eq!(h.agent.status_calls(), calls + 1);
    }

    #[tokio::test]
    async fn external_listeners_see_appmap_created() {
        let mut h = harness();
        h.agent.set_installed(false);
        h.watcher.initialize().await.unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = h.watcher.on_appmap_created(move |p| sink.lock().unwrap().push(p.clone()));

        h.watcher.notify_appmap_created(PathBuf::from("/x/a.appmap.json")).await;

        assert_eq!(*seen.lock().unwrap(), vec![PathBuf::from("/x/a.appmap.json")]);
        assert!(h.watcher.artifacts().has_appmap());
    }

    #[tokio::test]
    async fn existing_appmap_is_found_on_initialize() {
        let mut h = harness();
        std::fs::write(h.watcher.root().join("old.appmap.json"), "{}").unwrap();
        h.agent.push_status(Ok(Some(config_status(true, true))));
        h.watcher.initialize().await.unwrap();
        h.watcher.tick().await;
        assert_eq!(state(&h, MilestoneId::RecordAppmap), CompletionState::Complete);
    }

    #[tokio::test]
    async fn create_configuration_writes_file_and_reticks() {
        let mut h = harness();
        h.agent.push_status(Ok(Some(config_status(false, false))));
        h.watcher.initialize().await.unwrap();
        let calls = h.agent.status_calls();

        h.watcher
            .perform_milestone_action(MilestoneId::CreateConfiguration, None)
            .await
            .unwrap();

        let written = std::fs::read_to_string(h.watcher.root().join("appmap.yml")).unwrap();
        assert_eq!(written, "name: project\n");
        assert_eq!(h.agent.status_calls(), calls + 1);
        assert_eq!(h.watcher.appmap_yml().await.unwrap().as_deref(), Some("name: project\n"));
        assert_eq!(h.telemetry.count("milestone:action"), 1);
    }

    #[tokio::test]
    async fn record_action_passes_command() {
        let mut h = harness();
        h.agent.push_status(Ok(Some(config_status(true, true))));
        h.watcher.initialize().await.unwrap();

        h.watcher
            .perform_milestone_action(MilestoneId::RecordAppmap, Some(&json!({"command": "bundle exec rspec"})))
            .await
            .unwrap();
        h.watcher
            .perform_milestone_action(MilestoneId::RecordAppmap, None)
            .await
            .unwrap();

        assert_eq!(
            h.agent.test_calls(),
            vec![Some("bundle exec rspec".to_string()), None]
        );
    }

    #[tokio::test]
    async fn action_failures_propagate() {
        let mut h = harness();
        h.agent.set_installed(false);
        h.watcher.initialize().await.unwrap();
        h.agent.fail_install(true);
        let calls = h.agent.status_calls();

        let err = h
            .watcher
            .perform_milestone_action(MilestoneId::InstallAgent, None)
            .await
            .unwrap_err();

        assert!(matches!(err, WatcherError::Agent(_)), "{err}");
        assert_eq!(h.agent.status_calls(), calls);
        assert!(h.telemetry.events().iter().any(|e| matches!(
            e,
            TelemetryEvent::MilestoneAction { success: false, .. }
        )));
    }

    #[tokio::test]
    async fn action_without_binding_fails() {
        let mut h = harness();
        let err = h
            .watcher
            .perform_milestone_action(MilestoneId::InstallAgent, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WatcherError::NotBound));
    }

    #[tokio::test]
    async fn view_action_completes_view_milestone() {
        let mut h = harness();
        h.agent.push_status(Ok(Some(config_status(true, true))));
        h.watcher.initialize().await.unwrap();

        h.watcher
            .perform_milestone_action(MilestoneId::ViewAppmap, None)
            .await
            .unwrap();

        assert_eq!(state(&h, MilestoneId::ViewAppmap), CompletionState::Complete);
    }

    #[tokio::test]
    async fn set_language_rebinds_agent() {
        let dir = tempfile::tempdir().unwrap();
        let ruby = Arc::new(MockAgent::new());
        let python = Arc::new(MockAgent::with_language("python"));
        ruby.push_status(Ok(Some(config_status(true, true))));
        python.set_installed(false);
        let resolver = FixedResolver::new("ruby", Some(ruby.clone())).with_agent(python.clone());
        let mut watcher = ProjectWatcher::new(
            dir.path(),
            Arc::new(resolver),
            Arc::new(RecordingTelemetry::default()),
            WatcherConfig::default(),
        );
        watcher.initialize().await.unwrap();
        assert_eq!(watcher.state(), WatcherState::WatchProjectStatus);

        watcher.set_language("python").await.unwrap();

        assert_eq!(watcher.language().as_deref(), Some("python"));
        assert_eq!(watcher.state(), WatcherState::WaitForAgentInstall);
        assert!(watcher.last_status().is_none());
        assert!(python.is_installed_calls() > 0);

        assert!(matches!(
            watcher.set_language("cobol").await,
            Err(WatcherError::NoAgentForLanguage(_))
        ));
    }

    #[tokio::test]
    async fn language_override_before_initialize_skips_detection() {
        let dir = tempfile::tempdir().unwrap();
        let python = Arc::new(MockAgent::with_language("python"));
        python.push_status(Ok(Some(config_status(true, true))));
        let resolver = FixedResolver::new("java", None).with_agent(python.clone());
        let mut watcher = ProjectWatcher::new(
            dir.path(),
            Arc::new(resolver),
            Arc::new(RecordingTelemetry::default()),
            WatcherConfig::default(),
        );

        watcher.set_language("python").await.unwrap();
        assert_eq!(python.is_installed_calls(), 0);
        watcher.initialize().await.unwrap();

        assert_eq!(watcher.language().as_deref(), Some("python"));
        assert_eq!(watcher.lifecycle(), Lifecycle::Initialized);
        assert_eq!(watcher.state(), WatcherState::WatchProjectStatus);
        assert_eq!(python.status_calls(), 1);
    }

    #[tokio::test]
    async fn configuration_stays_under_root() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("proj");
        std::fs::create_dir(&root).unwrap();
        let file = |filename: &str| ConfigurationFile {
            filename: filename.to_string(),
            contents: "name: project\n".to_string(),
        };

        for bad in ["../escaped.yml", "/tmp/escaped.yml", "conf/../../escaped.yml", ""] {
            let err = write_configuration(&root, &file(bad)).await.unwrap_err();
            assert!(matches!(err, WatcherError::ConfigOutsideProject(_)), "{bad}: {err}");
        }
        assert!(!outer.path().join("escaped.yml").exists());

        std::fs::create_dir(root.join("config")).unwrap();
        assert!(write_configuration(&root, &file("./config/appmap.yml")).await.unwrap());
        assert!(root.join("config/appmap.yml").exists());
    }

    #[tokio::test]
    async fn test_commands_come_from_last_status() {
        let mut h = harness();
        h.agent.push_status(Ok(Some(StatusSnapshot::new(json!({
            "properties": { "config": { "present": true, "valid": true } },
            "test_commands": [{ "command": "bundle exec rspec" }]
        })))));
        assert!(h.watcher.test_commands().is_empty());
        h.watcher.initialize().await.unwrap();
        assert_eq!(h.watcher.test_commands()[0].command, "bundle exec rspec");
    }

    #[tokio::test]
    async fn end_to_end_onboarding() {
        let mut h = harness();
        h.agent.set_installed(false);
        h.watcher.initialize().await.unwrap();
        assert_eq!(state(&h, MilestoneId::InstallAgent), CompletionState::Incomplete);

        h.agent.set_installed(true);
        h.agent.push_status(Ok(Some(config_status(false, false))));
        h.watcher.tick().await;
        assert_eq!(h.watcher.state(), WatcherState::WatchProjectStatus);
        assert_eq!(state(&h, MilestoneId::InstallAgent), CompletionState::Complete);

        h.agent.push_status(Ok(Some(config_status(true, true))));
        h.watcher
            .perform_milestone_action(MilestoneId::CreateConfiguration, None)
            .await
            .unwrap();
        assert_eq!(state(&h, MilestoneId::CreateConfiguration), CompletionState::Complete);
        assert_eq!(state(&h, MilestoneId::RecordAppmap), CompletionState::Incomplete);
        assert_eq!(state(&h, MilestoneId::ViewAppmap), CompletionState::Incomplete);

        let scheduled = h.watcher.next_tick_at();
        let root = h.watcher.root().to_path_buf();
        h.watcher.notify_appmap_created(root.join("tmp/appmap/a.appmap.json")).await;
        assert_eq!(state(&h, MilestoneId::RecordAppmap), CompletionState::Complete);
        assert_ne!(h.watcher.next_tick_at(), None);
        assert!(h.watcher.next_tick_at() >= scheduled);
    }
}
