//! Watch graph between fields
//!
//! A field UID (`kind \0 id \0 field`) maps to the watchers interested in it.
//! Triggering a field calls every watcher's callback; this is how fields
//! that returned `NotReady` get recomputed once their dependencies settle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

/// Callback run when a watched field is triggered
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// UID of a field of a resource instance
pub fn field_uid(kind: &str, id: &str, field: &str) -> String {
    format!("{}\x00{}\x00{}", kind, id, field)
}

/// Registry of field watchers
#[derive(Default)]
pub struct Observers {
    /// field UID -> watcher UID -> callback
    watchers: DashMap<String, BTreeMap<String, Callback>>,
    /// watcher UID -> watched field UIDs
    watching: DashMap<String, BTreeSet<String>>,
}

impl Observers {
    /// Create an empty watch graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `field` on behalf of `watcher`.
    ///
    /// Returns `(is_initial, exists)`: whether this is the first watcher of
    /// the field, and whether `watcher` was already watching it (in which
    /// case the existing callback is kept).
    pub fn watch(&self, field: &str, watcher: &str, callback: Callback) -> (bool, bool) {
        let (is_initial, exists) = {
            let mut entry = self.watchers.entry(field.to_string()).or_default();
            let is_initial = entry.is_empty();
            let exists = entry.contains_key(watcher);
            if !exists {
                entry.insert(watcher.to_string(), callback);
            }
            (is_initial, exists)
        };

        self.watching
            .entry(watcher.to_string())
            .or_default()
            .insert(field.to_string());

        trace!(
            field = %field.replace('\x00', "/"),
            watcher = %watcher.replace('\x00', "/"),
            is_initial,
            exists,
            "watch"
        );
        (is_initial, exists)
    }

    /// Call every watcher of `field`. Returns how many were called.
    pub fn trigger(&self, field: &str) -> usize {
        // callbacks may watch or trigger again, so none may run under the map lock
        let callbacks: Vec<Callback> = match self.watchers.get(field) {
            Some(entry) => entry.values().cloned().collect(),
            None => return 0,
        };

        trace!(field = %field.replace('\x00', "/"), watchers = callbacks.len(), "trigger");
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    /// Remove `watcher` from every field it watches
    pub fn unwatch_all(&self, watcher: &str) {
        let fields = match self.watching.remove(watcher) {
            Some((_, fields)) => fields,
            None => return,
        };
        for field in fields {
            let now_empty = match self.watchers.get_mut(&field) {
                Some(mut entry) => {
                    entry.remove(watcher);
                    entry.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.watchers.remove_if(&field, |_, w| w.is_empty());
            }
        }
    }

    /// Watcher UIDs of a field, sorted
    pub fn watchers_of(&self, field: &str) -> Vec<String> {
        self.watchers
            .get(field)
            .map(|entry| entry.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Check if anything watches `field`
    pub fn is_watched(&self, field: &str) -> bool {
        self.watchers
            .get(field)
            .map(|entry| !entry.is_empty())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("fields", &self.watchers.len())
            .field("watchers", &self.watching.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_watch_flags() {
        let observers = Observers::new();
        let (_, cb) = counter();
        let field = field_uid("file", "/etc/hosts", "path");

        assert_eq!(observers.watch(&field, "a", cb.clone()), (true, false));
        assert_eq!(observers.watch(&field, "b", cb.clone()), (false, false));
        assert_eq!(observers.watch(&field, "a", cb), (false, true));
        assert_eq!(observers.watchers_of(&field), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_trigger_and_unwatch() {
        let observers = Observers::new();
        let (count, cb) = counter();
        observers.watch("f1", "w", cb.clone());
        observers.watch("f2", "w", cb);

        assert_eq!(observers.trigger("f1"), 1);
        assert_eq!(observers.trigger("missing"), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        observers.unwatch_all("w");
        assert!(!observers.is_watched("f1"));
        assert_eq!(observers.trigger("f2"), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_watch_during_trigger() {
        let observers = Arc::new(Observers::new());
        let inner = observers.clone();
        observers.watch(
            "f",
            "w",
            Arc::new(move || {
                inner.watch("f", "late", Arc::new(|| {}));
            }),
        );
        assert_eq!(observers.trigger("f"), 1);
        assert!(observers.watchers_of("f").contains(&"late".to_string()));
    }
}
