//! The task that owns a [`ProjectWatcher`] and the handle used to talk to it.
//!
//! Each watcher runs on its own task. The loop waits for whichever comes
//! first: cancellation, a command from a [`WatcherHandle`], or the watcher's
//! next tick deadline. Everything the watcher does therefore happens on one
//! task, one step at a time, and a forced tick simply replaces the pending
//! deadline.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use appmap_core::{EventEmitter, MilestoneId, MilestoneMap, StatusCommand, Subscription};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::WatcherError;
use crate::project_watcher::{ProjectWatcher, read_appmap_yml};

const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, WatcherError>>;

#[derive(Debug)]
enum WatcherCommand {
    ForceTick(Reply<()>),
    AppMapCreated(PathBuf),
    AppMapOpened,
    PerformAction {
        id: MilestoneId,
        data: Option<Value>,
        reply: Reply<()>,
    },
    SetLanguage {
        language: String,
        reply: Reply<()>,
    },
    TestCommands(Reply<Vec<StatusCommand>>),
}

/// Cloneable handle onto a running project watcher.
#[derive(Clone)]
pub struct WatcherHandle {
    root: PathBuf,
    tx: mpsc::Sender<WatcherCommand>,
    milestones: Arc<MilestoneMap>,
    language: Arc<RwLock<Option<String>>>,
    appmap_created: EventEmitter<PathBuf>,
    cancel: CancellationToken,
}

/// Move an initialized watcher onto its own task.
pub fn spawn(watcher: ProjectWatcher) -> (WatcherHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = WatcherHandle {
        root: watcher.root().to_path_buf(),
        tx,
        milestones: Arc::clone(watcher.milestones()),
        language: watcher.shared_language(),
        appmap_created: watcher.appmap_created_emitter(),
        cancel: watcher.cancel_token(),
    };
    let task = tokio::spawn(run(watcher, rx));
    (handle, task)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run(mut watcher: ProjectWatcher, mut rx: mpsc::Receiver<WatcherCommand>) {
    let cancel = watcher.cancel_token();
    tracing::debug!(root = %watcher.root().display(), "watcher task started");

    loop {
        let deadline = watcher.next_tick_at();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            command = rx.recv() => match command {
                Some(command) => handle_command(&mut watcher, command).await,
                None => {
                    tracing::debug!(root = %watcher.root().display(), "all handles dropped");
                    break;
                }
            },
            _ = sleep_until(deadline) => watcher.tick().await,
        }
    }

    watcher.dispose();
    tracing::debug!(root = %watcher.root().display(), "watcher task stopped");
}

async fn handle_command(watcher: &mut ProjectWatcher, command: WatcherCommand) {
    match command {
        WatcherCommand::ForceTick(reply) => {
            watcher.force_next_tick().await;
            let _ = reply.send(Ok(()));
        }
        WatcherCommand::AppMapCreated(path) => watcher.notify_appmap_created(path).await,
        WatcherCommand::AppMapOpened => watcher.mark_appmap_opened(),
        WatcherCommand::PerformAction { id, data, reply } => {
            let result = watcher.perform_milestone_action(id, data.as_ref()).await;
            let _ = reply.send(result);
        }
        WatcherCommand::SetLanguage { language, reply } => {
            let _ = reply.send(watcher.set_language(&language).await);
        }
        WatcherCommand::TestCommands(reply) => {
            let _ = reply.send(Ok(watcher.test_commands()));
        }
    }
}

impl WatcherHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn milestones(&self) -> &Arc<MilestoneMap> {
        &self.milestones
    }

    pub fn language(&self) -> Option<String> {
        self.language.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn on_appmap_created(
        &self,
        listener: impl Fn(&PathBuf) + Send + Sync + 'static,
    ) -> Subscription {
        self.appmap_created.subscribe(listener)
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Tick now, replacing the pending scheduled tick. Resolves once the
    /// tick has run.
    pub async fn force_tick(&self) -> Result<(), WatcherError> {
        self.request(WatcherCommand::ForceTick).await
    }

    pub async fn appmap_created(&self, path: PathBuf) -> Result<(), WatcherError> {
        self.send(WatcherCommand::AppMapCreated(path)).await
    }

    pub async fn appmap_opened(&self) -> Result<(), WatcherError> {
        self.send(WatcherCommand::AppMapOpened).await
    }

    pub async fn perform_milestone_action(
        &self,
        id: MilestoneId,
        data: Option<Value>,
    ) -> Result<(), WatcherError> {
        self.request(|reply| WatcherCommand::PerformAction { id, data, reply })
            .await
    }

    pub async fn set_language(&self, language: impl Into<String>) -> Result<(), WatcherError> {
        let language = language.into();
        self.request(|reply| WatcherCommand::SetLanguage { language, reply })
            .await
    }

    pub async fn test_commands(&self) -> Result<Vec<StatusCommand>, WatcherError> {
        self.request(WatcherCommand::TestCommands).await
    }

    pub async fn appmap_yml(&self) -> Result<Option<String>, WatcherError> {
        read_appmap_yml(&self.root).await
    }

    /// Stop the watcher task. In-flight work finishes; nothing new starts.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    async fn send(&self, command: WatcherCommand) -> Result<(), WatcherError> {
        if self.is_disposed() {
            return Err(WatcherError::Disposed);
        }
        self.tx.send(command).await.map_err(|_| WatcherError::Closed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> WatcherCommand,
    ) -> Result<T, WatcherError> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply)).await?;
        rx.await.map_err(|_| WatcherError::Closed)?
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
