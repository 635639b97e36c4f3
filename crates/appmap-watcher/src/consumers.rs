//! Event-driven views over project milestones.
//!
//! Neither consumer is known to the watcher: each subscribes to milestone
//! change events, re-derives its own view and notifies its own listeners.
//! Dropping a consumer drops its subscriptions.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use appmap_core::{CompletionState, EventEmitter, MilestoneId, MilestoneMap, Subscription};
use serde::Serialize;

// ─── Milestone tree ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneRow {
    /// 1-based position in the onboarding sequence.
    pub step: usize,
    pub id: MilestoneId,
    pub label: String,
    pub state: CompletionState,
}

fn derive_rows(milestones: &MilestoneMap) -> Vec<MilestoneRow> {
    milestones
        .iter()
        .enumerate()
        .map(|(i, m)| MilestoneRow {
            step: i + 1,
            id: m.id(),
            label: m.label().to_string(),
            state: m.state(),
        })
        .collect()
}

/// Ordered milestone rows for one project.
pub struct MilestoneTree {
    root: PathBuf,
    rows: Arc<Mutex<Vec<MilestoneRow>>>,
    on_did_change: EventEmitter<Vec<MilestoneRow>>,
    _subscriptions: Vec<Subscription>,
}

impl MilestoneTree {
    pub fn new(milestones: &Arc<MilestoneMap>) -> Self {
        let rows = Arc::new(Mutex::new(derive_rows(milestones)));
        let on_did_change = EventEmitter::new();
        let weak: Weak<MilestoneMap> = Arc::downgrade(milestones);

        let subscriptions = milestones
            .iter()
            .map(|milestone| {
                let weak = weak.clone();
                let rows = Arc::clone(&rows);
                let on_did_change = on_did_change.clone();
                milestone.on_change_state(move |_| {
                    let Some(map) = weak.upgrade() else {
                        return;
                    };
                    let fresh = derive_rows(&map);
                    *rows.lock().unwrap_or_else(|p| p.into_inner()) = fresh.clone();
                    on_did_change.fire(&fresh);
                })
            })
            .collect();

        let root = milestones
            .iter()
            .next()
            .map(|m| m.root().to_path_buf())
            .unwrap_or_default();

        Self {
            root,
            rows,
            on_did_change,
            _subscriptions: subscriptions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rows(&self) -> Vec<MilestoneRow> {
        self.rows.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn on_did_change(
        &self,
        listener: impl Fn(&Vec<MilestoneRow>) + Send + Sync + 'static,
    ) -> Subscription {
        self.on_did_change.subscribe(listener)
    }
}

// ─── Installation badge ─────────────────────────────────────────────

#[derive(Default)]
struct BadgeState {
    /// Incomplete milestone count per tracked project.
    remaining: BTreeMap<PathBuf, usize>,
    badge: Option<usize>,
}

impl BadgeState {
    /// Badge value: the remaining step count when exactly one project still
    /// has steps left, otherwise nothing.
    fn compute(&self) -> Option<usize> {
        let mut installable = self.remaining.values().filter(|n| **n > 0);
        match (installable.next(), installable.next()) {
            (Some(n), None) => Some(*n),
            _ => None,
        }
    }
}

fn remaining_steps(milestones: &MilestoneMap) -> usize {
    milestones
        .iter()
        .filter(|m| m.state() != CompletionState::Complete)
        .count()
}

/// Remaining-steps badge across every tracked project.
#[derive(Default)]
pub struct InstallationBadge {
    state: Arc<Mutex<BadgeState>>,
    on_change: EventEmitter<Option<usize>>,
    subscriptions: Mutex<HashMap<PathBuf, Vec<Subscription>>>,
}

impl InstallationBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn badge(&self) -> Option<usize> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).badge
    }

    pub fn on_change(&self, listener: impl Fn(&Option<usize>) + Send + Sync + 'static) -> Subscription {
        self.on_change.subscribe(listener)
    }

    /// Start counting the milestones of the project at `root`.
    pub fn track(&self, root: &Path, milestones: &Arc<MilestoneMap>) {
        let weak: Weak<MilestoneMap> = Arc::downgrade(milestones);
        let subs: Vec<Subscription> = milestones
            .iter()
            .map(|milestone| {
                let weak = weak.clone();
                let state = Arc::clone(&self.state);
                let on_change = self.on_change.clone();
                let root = root.to_path_buf();
                milestone.on_change_state(move |_| {
                    if let Some(map) = weak.upgrade() {
                        update(&state, &on_change, root.clone(), Some(remaining_steps(&map)));
                    }
                })
            })
            .collect();

        self.subscriptions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(root.to_path_buf(), subs);
        update(&self.state, &self.on_change, root.to_path_buf(), Some(remaining_steps(milestones)));
    }

    pub fn untrack(&self, root: &Path) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(root);
        update(&self.state, &self.on_change, root.to_path_buf(), None);
    }
}

/// Set (or with `None`, forget) the count for `root` and notify listeners if
/// the badge changed. The lock is released before listeners run.
fn update(
    state: &Mutex<BadgeState>,
    on_change: &EventEmitter<Option<usize>>,
    root: PathBuf,
    remaining: Option<usize>,
) {
    let changed = {
        let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
        match remaining {
            Some(n) => state.remaining.insert(root, n),
            None => state.remaining.remove(&root),
        };
        let badge = state.compute();
        (badge != state.badge).then(|| {
            state.badge = badge;
            badge
        })
    };
    if let Some(badge) = changed {
        on_change.fire(&badge);
    }
}
