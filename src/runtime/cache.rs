//! Per-instance field cache
//!
//! Each field of a resource instance owns one slot moving through
//! `Unset -> Computing -> Stored`. Claiming a slot for computation is a
//! single-flight operation: a second caller finds it `Computing` and gets
//! [`Claim::Busy`] instead of starting another computation.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::value::Value;
use crate::error::Error;

/// Cached result of one field
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Field value (`Null` for error entries)
    pub data: Value,
    /// True when `data` holds a usable value
    pub valid: bool,
    /// Error the computation ended with
    pub error: Option<Error>,
    /// Unix time in milliseconds when the entry was stored
    pub timestamp: i64,
}

impl CacheEntry {
    /// A valid entry stamped with the current time
    pub fn valid(data: Value) -> Self {
        CacheEntry {
            data,
            valid: true,
            error: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// An error entry stamped with the current time
    pub fn error(error: Error) -> Self {
        CacheEntry {
            data: Value::Null,
            valid: false,
            error: Some(error),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// The entry as a field result
    pub fn result(&self) -> Option<crate::error::Result<Value>> {
        if let Some(err) = &self.error {
            return Some(Err(err.clone()));
        }
        if self.valid {
            return Some(Ok(self.data.clone()));
        }
        None
    }
}

#[derive(Debug)]
enum FieldState {
    Unset,
    /// A computation is in flight; readers still see the previous entry
    Computing { previous: Option<CacheEntry> },
    Stored(CacheEntry),
}

type Slot = Arc<Mutex<FieldState>>;

/// Observable state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    /// Nothing stored, nothing running
    Unset,
    /// A computation holds the slot
    Computing,
    /// A valid value is stored
    Valid,
    /// An error is stored
    Error,
}

/// Outcome of trying to claim a slot for computation
#[derive(Debug)]
pub enum Claim {
    /// The caller owns the computation and must finish or drop the guard
    Acquired(ComputeGuard),
    /// Someone else is computing this field
    Busy,
    /// A settled entry already exists
    Ready(CacheEntry),
}

/// Ownership of an in-flight computation. Dropping it without
/// [`finish`](ComputeGuard::finish) puts the previous entry back.
#[derive(Debug)]
pub struct ComputeGuard {
    slot: Slot,
    finished: bool,
}

impl ComputeGuard {
    /// Store the computed entry and release the slot
    pub fn finish(mut self, entry: CacheEntry) {
        *self.slot.lock() = FieldState::Stored(entry);
        self.finished = true;
    }
}

impl Drop for ComputeGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.slot.lock();
        let previous = match &mut *state {
            FieldState::Computing { previous } => previous.take(),
            _ => return,
        };
        *state = match previous {
            Some(entry) => FieldState::Stored(entry),
            None => FieldState::Unset,
        };
    }
}

/// Field cache of one resource instance
#[derive(Debug, Default)]
pub struct Cache {
    slots: DashMap<String, Slot>,
}

impl Cache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, field: &str) -> Slot {
        // clone the Arc so the shard lock is released before the slot is locked
        self.slots
            .entry(field.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(FieldState::Unset)))
            .value()
            .clone()
    }

    /// Load the current entry of a field. While a recomputation runs this
    /// is the previous entry.
    pub fn load(&self, field: &str) -> Option<CacheEntry> {
        let slot = self.slots.get(field)?.value().clone();
        let state = slot.lock();
        match &*state {
            FieldState::Stored(entry) => Some(entry.clone()),
            FieldState::Computing { previous } => previous.clone(),
            FieldState::Unset => None,
        }
    }

    /// Store an entry directly, bypassing any computation
    pub fn store(&self, field: &str, entry: CacheEntry) {
        *self.slot(field).lock() = FieldState::Stored(entry);
    }

    /// Evict a single field
    pub fn delete(&self, field: &str) {
        if let Some(slot) = self.slots.get(field) {
            let mut state = slot.lock();
            if let FieldState::Stored(_) = &*state {
                *state = FieldState::Unset;
            }
        }
    }

    /// Current state of a field
    pub fn status(&self, field: &str) -> FieldStatus {
        let slot = match self.slots.get(field) {
            Some(slot) => slot.value().clone(),
            None => return FieldStatus::Unset,
        };
        let state = slot.lock();
        match &*state {
            FieldState::Unset => FieldStatus::Unset,
            FieldState::Computing { .. } => FieldStatus::Computing,
            FieldState::Stored(entry) if entry.error.is_some() => FieldStatus::Error,
            FieldState::Stored(entry) if entry.valid => FieldStatus::Valid,
            FieldState::Stored(_) => FieldStatus::Unset,
        }
    }

    /// Claim a field for computation.
    ///
    /// With `force` unset a settled entry short-circuits to
    /// [`Claim::Ready`]; with `force` set the entry is recomputed and kept
    /// visible to readers until the new one is stored.
    pub fn claim(&self, field: &str, force: bool) -> Claim {
        let slot = self.slot(field);
        let mut state = slot.lock();
        let previous = match &*state {
            FieldState::Computing { .. } => return Claim::Busy,
            FieldState::Stored(entry) if !force && (entry.valid || entry.error.is_some()) => {
                return Claim::Ready(entry.clone())
            }
            FieldState::Stored(entry) => Some(entry.clone()),
            FieldState::Unset => None,
        };
        *state = FieldState::Computing { previous };
        drop(state);

        Claim::Acquired(ComputeGuard {
            slot,
            finished: false,
        })
    }

    /// Evict every settled entry stored before `timestamp` (unix
    /// milliseconds). Returns the evicted field names.
    pub fn evict_older_than(&self, timestamp: i64) -> Vec<String> {
        let mut evicted = Vec::new();
        for item in self.slots.iter() {
            let mut state = item.value().lock();
            let stale = matches!(&*state, FieldState::Stored(entry) if entry.timestamp < timestamp);
            if stale {
                *state = FieldState::Unset;
                evicted.push(item.key().clone());
            }
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), before = timestamp, "evicted cache entries");
        }
        evicted
    }

    /// Evict one field if its entry was stored before `timestamp`
    pub fn evict_field_older_than(&self, field: &str, timestamp: i64) -> bool {
        let slot = match self.slots.get(field) {
            Some(slot) => slot.value().clone(),
            None => return false,
        };
        let mut state = slot.lock();
        let stale = matches!(&*state, FieldState::Stored(entry) if entry.timestamp < timestamp);
        if stale {
            *state = FieldState::Unset;
        }
        stale
    }

    /// Names of fields with a stored entry, sorted
    pub fn stored_fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .iter()
            .filter(|item| matches!(&*item.value().lock(), FieldState::Stored(_)))
            .map(|item| item.key().clone())
            .collect();
        names.sort();
        names
    }
}
