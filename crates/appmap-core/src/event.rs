//! Observer lists with RAII unsubscription.
//!
//! An [`EventEmitter`] is a cheap, cloneable handle onto a shared listener
//! table. Subscribing returns a [`Subscription`]; dropping (or disposing) the
//! subscription removes exactly that listener. Consumers that hold several
//! subscriptions keep them in a `Vec<Subscription>` and drop the vector when
//! they go away, which releases all of them at once.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    next_id: u64,
    entries: HashMap<u64, Listener<T>>,
}

impl<T> Listeners<T> {
    fn new() -> Self {
        Self {
            next_id: 0,
            entries: HashMap::new(),
        }
    }
}

fn lock<T>(table: &Mutex<Listeners<T>>) -> MutexGuard<'_, Listeners<T>> {
    // A listener that panicked while the table was locked leaves it intact.
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Multi-subscriber event source.
pub struct EventEmitter<T> {
    table: Arc<Mutex<Listeners<T>>>,
}

impl<T: 'static> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(Listeners::new())),
        }
    }

    /// Register `listener`. It stays registered until the returned
    /// [`Subscription`] is dropped or disposed.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut table = lock(&self.table);
            let id = table.next_id;
            table.next_id += 1;
            table.entries.insert(id, Arc::new(listener));
            id
        };

        let weak: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.table);
        Subscription::new(move || {
            if let Some(table) = weak.upgrade() {
                lock(&table).entries.remove(&id);
            }
        })
    }

    /// Invoke every registered listener with `value`.
    ///
    /// Listeners run without the table lock held, so they may subscribe or
    /// unsubscribe (including themselves) while the event is delivered. A
    /// listener removed by an earlier listener in the same round is skipped.
    pub fn fire(&self, value: &T) {
        let snapshot: Vec<(u64, Listener<T>)> = {
            let table = lock(&self.table);
            let mut ids: Vec<_> = table.entries.iter().map(|(id, l)| (*id, Arc::clone(l))).collect();
            ids.sort_by_key(|(id, _)| *id);
            ids
        };

        for (id, listener) in snapshot {
            if !lock(&self.table).entries.contains_key(&id) {
                continue;
            }
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.table).entries.len()
    }
}

impl<T: 'static> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T> fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &lock(&self.table).entries.len())
            .finish()
    }
}

/// Handle for one registered listener. Unsubscribes on drop.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Unsubscribe now. Equivalent to dropping the handle.
    pub fn dispose(mut self) {
        self.unsubscribe();
    }

    fn unsubscribe(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
