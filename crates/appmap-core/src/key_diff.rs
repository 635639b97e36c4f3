//! Dotted-path comparison of two JSON snapshots.
//!
//! [`ObjectKeyDiff`] compares the previous and current status snapshot one
//! key path at a time (`"properties.config.present"`). Without a previous
//! snapshot nothing is ever reported as changed: the first observation has
//! nothing to diff against.

use serde_json::Value;

/// Resolve a dotted key path through nested objects.
///
/// Returns `None` at the first missing link. Array elements are addressed by
/// their decimal index (`"test_commands.0.command"`); any other scalar in the
/// middle of the path is a missing link.
pub fn resolve_key<'v>(key: &str, value: &'v Value) -> Option<&'v Value> {
    key.split('.').try_fold(value, |node, token| match node {
        Value::Object(map) => map.get(token),
        Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectKeyDiff<'a> {
    last: Option<&'a Value>,
    current: &'a Value,
}

impl<'a> ObjectKeyDiff<'a> {
    pub fn new(last: Option<&'a Value>, current: &'a Value) -> Self {
        Self { last, current }
    }

    /// `(previous, current)` values at `key`, or `None` without a previous
    /// snapshot.
    pub fn values(&self, key: &str) -> Option<(Option<&'a Value>, Option<&'a Value>)> {
        let last = self.last?;
        Some((resolve_key(key, last), resolve_key(key, self.current)))
    }

    /// `true` iff a previous snapshot exists and the value at `key` differs.
    pub fn changed(&self, key: &str) -> bool {
        matches!(self.values(key), Some((before, after)) if before != after)
    }

    /// `true` iff `key` changed and its current value equals `value`.
    pub fn value_changed_to(&self, key: &str, value: &Value) -> bool {
        self.changed(key) && resolve_key(key, self.current) == Some(value)
    }

    /// Invoke `callback(new, old)` synchronously when the value at `key`
    /// changed. Returns `self` so several keys can be chained; each key is
    /// evaluated independently.
    pub fn on<F>(&self, key: &str, callback: F) -> &Self
    where
        F: FnOnce(Option<&'a Value>, Option<&'a Value>),
    {
        if let Some((before, after)) = self.values(key) {
            if before != after {
                callback(after, before);
            }
        }
        self
    }
}
