//! Memoization store for cacheable dependencies.
//!
//! The store maps `(callable identity, cache key)` to a shared future. The
//! future is committed under the lock before any suspension point, so two
//! executions that race on the same cacheable dependency coalesce onto one
//! run of the underlying body. Successful results persist for the lifetime
//! of the store; aborted outcomes are evicted on completion so a later
//! invocation retries.

use std::collections::HashMap;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::depend::{DependId, DependValue};

/// The result of one dependency invocation.
#[derive(Clone)]
pub enum DependOutcome {
    /// The target produced a value.
    Resolved(DependValue),
    /// The target failed; the chain aborts with the failure sentinel.
    Aborted,
}

impl DependOutcome {
    /// Whether this outcome is the failure sentinel.
    pub fn is_aborted(&self) -> bool {
        matches!(self, DependOutcome::Aborted)
    }
}

type SharedOutcome = Shared<BoxFuture<'static, DependOutcome>>;

/// An explicit cache store keyed by dependency identity.
pub struct MemoStore {
    entries: Mutex<HashMap<(DependId, String), SharedOutcome>>,
    capacity: Option<usize>,
}

impl MemoStore {
    /// Creates an unbounded store (results never expire).
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Creates a store that holds at most `capacity` entries, evicting an
    /// arbitrary entry once the bound is exceeded.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    /// Creates a store with an optional bound.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Returns the shared invocation for `(id, key)`, inserting the future
    /// built by `make` on first sight.
    ///
    /// The insert-check-insert sequence runs entirely under the lock with
    /// no suspension point before the entry is committed.
    pub fn get_or_insert_with<F>(&self, id: DependId, key: String, make: F) -> SharedOutcome
    where
        F: FnOnce() -> BoxFuture<'static, DependOutcome>,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&(id, key.clone())) {
            return existing.clone();
        }
        if let Some(capacity) = self.capacity
            && entries.len() >= capacity
            && let Some(victim) = entries.keys().next().cloned()
        {
            entries.remove(&victim);
        }
        let shared = make().shared();
        entries.insert((id, key), shared.clone());
        shared
    }

    /// Drops the entry for `(id, key)`, if present.
    pub fn evict(&self, id: DependId, key: &str) {
        self.entries.lock().remove(&(id, key.to_string()));
    }

    /// Number of memoized invocations.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for MemoStore {
    fn default() -> Self {
        Self::new()
    }
}
