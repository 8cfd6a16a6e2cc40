#![forbid(unsafe_code)]

//! Cached derived values with dependency discovery.
//!
//! # Design
//!
//! A computed key owns a function `Fn(&ReactiveStore) -> Result<Value, _>`.
//! The first successful run happens in *tracking mode*: every key the
//! function reads through the store is recorded as a dependency. Later runs
//! are untracked, so the dependency set is fixed after that first run. A
//! function whose reads depend on a condition keeps the keys it read the
//! first time; later reads of other keys never trigger invalidation.
//!
//! When a plain key changes, every computed key that depends on it, directly
//! or through other computed keys, is invalidated and then recomputed in
//! dependency order. Each is recomputed once per cascade and its watchers
//! receive `(new, undefined)`.
//!
//! # Invariants
//!
//! 1. Invalidation removes the cached value, never the dependency set.
//! 2. A read of a computed key from inside its own computation returns the
//!    last value it produced (or `undefined`) instead of recursing.
//! 3. A failed computation leaves the cache empty, so the next read retries.
//!
//! # Failure Modes
//!
//! - **Dependency cycle between computed keys**: ordering falls back to
//!   definition order and the re-entrancy guard stops the recursion; the
//!   values involved may be stale.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use bww_core::Value;
use indexmap::{IndexMap, IndexSet};

use bww_core::logging::{debug, trace, warn};

use super::store::{ReactiveStore, StoreInner};
use crate::error::{BoxError, Result, StateError};

/// A computation function.
pub type ComputeFn = Rc<dyn Fn(&ReactiveStore) -> std::result::Result<Value, BoxError>>;

/// Reads recorded while one computation runs in tracking mode.
pub(crate) struct TrackingFrame {
    key: String,
    dependencies: IndexSet<String>,
}

impl TrackingFrame {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            dependencies: IndexSet::new(),
        }
    }

    pub(crate) fn record(&mut self, key: &str) {
        if key != self.key {
            self.dependencies.insert(key.to_string());
        }
    }
}

struct ComputedEntry {
    compute: ComputeFn,
    dependencies: IndexSet<String>,
    /// Set once a tracked run succeeded.
    tracked: bool,
    is_computing: bool,
    last_value: Value,
    version: u64,
}

#[derive(Default)]
pub(crate) struct ComputedEngine {
    entries: IndexMap<String, ComputedEntry>,
    cache: HashMap<String, Value>,
}

impl ComputedEngine {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Register or replace `key`. A replaced key keeps its position.
    fn insert(&mut self, key: &str, compute: ComputeFn) {
        self.cache.remove(key);
        self.entries.insert(
            key.to_string(),
            ComputedEntry {
                compute,
                dependencies: IndexSet::new(),
                tracked: false,
                is_computing: false,
                last_value: Value::Undefined,
                version: 0,
            },
        );
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.cache.clear();
    }

    /// Computed keys affected by a change of `changed`, in the order they
    /// must be recomputed.
    ///
    /// A key never comes before another affected key it depends on. Among
    /// keys with no such constraint, definition order wins. `changed` itself
    /// is never included.
    fn cascade_order(&self, changed: &str) -> Vec<String> {
        let mut affected: HashSet<&str> = HashSet::new();
        let mut frontier = vec![changed];
        while let Some(current) = frontier.pop() {
            for (key, entry) in &self.entries {
                if key != changed
                    && entry.dependencies.contains(current)
                    && affected.insert(key.as_str())
                {
                    frontier.push(key.as_str());
                }
            }
        }

        let mut pending: Vec<&str> = self
            .entries
            .keys()
            .map(String::as_str)
            .filter(|key| affected.contains(key))
            .collect();
        let mut placed: HashSet<&str> = HashSet::with_capacity(pending.len());
        let mut ordered = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let ready = pending.iter().position(|key| {
                self.entries.get(*key).is_none_or(|entry| {
                    entry.dependencies.iter().all(|dep| {
                        !affected.contains(dep.as_str()) || placed.contains(dep.as_str())
                    })
                })
            });
            // No ready key means a cycle: take the earliest defined one.
            let next = pending.remove(ready.unwrap_or(0));
            placed.insert(next);
            ordered.push(next.to_string());
        }
        ordered
    }
}

/// Clears the running state of a computation when it finishes, including by
/// unwinding out of the user function.
struct ComputingGuard<'a> {
    inner: &'a StoreInner,
    key: &'a str,
    depth: usize,
}

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.inner.tracking.borrow_mut().truncate(self.depth);
        if let Some(entry) = self.inner.computed.borrow_mut().entries.get_mut(self.key) {
            entry.is_computing = false;
        }
    }
}

impl ReactiveStore {
    /// Register `key` as computed from `compute` and run it once in tracking
    /// mode.
    ///
    /// Returns the first value. On failure the key stays registered with an
    /// empty cache and is retried on the next read. Redefining a computed key
    /// replaces its function and dependencies; a plain key cannot become
    /// computed.
    pub fn computed<F>(&self, key: impl Into<String>, compute: F) -> Result<Value>
    where
        F: Fn(&ReactiveStore) -> std::result::Result<Value, BoxError> + 'static,
    {
        let key = key.into();
        if self.inner.state.borrow().contains_key(&key) {
            warn!(key = %key, "computed.define refused: key holds a plain value");
            return Err(StateError::KeyConflict { key });
        }

        self.inner.computed.borrow_mut().insert(&key, Rc::new(compute));
        self.inner.watchers.borrow_mut().ensure_key(&key);
        debug!(key = %key, "computed.define");

        self.run_compute(&key, true)
    }

    #[must_use]
    pub fn is_computed(&self, key: &str) -> bool {
        self.inner.computed.borrow().contains(key)
    }

    /// Computed keys in definition order.
    #[must_use]
    pub fn computed_keys(&self) -> Vec<String> {
        self.inner.computed.borrow().entries.keys().cloned().collect()
    }

    /// Keys `key` was found to read, in first-read order. Empty for unknown
    /// keys and for computed keys that have not yet computed successfully.
    #[must_use]
    pub fn dependencies(&self, key: &str) -> Vec<String> {
        self.inner
            .computed
            .borrow()
            .entries
            .get(key)
            .map(|entry| entry.dependencies.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_cached(&self, key: &str) -> bool {
        self.inner.computed.borrow().cache.contains_key(key)
    }

    /// Drop the cached value of `key` without recomputing or notifying.
    /// Returns whether a value was cached.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.inner.computed.borrow_mut().cache.remove(key).is_some();
        trace!(key, removed, "computed.invalidate");
        removed
    }

    /// Number of successful computations of `key`, or `None` if it is not
    /// computed.
    #[must_use]
    pub fn computed_version(&self, key: &str) -> Option<u64> {
        self.inner
            .computed
            .borrow()
            .entries
            .get(key)
            .map(|entry| entry.version)
    }

    pub(super) fn read_computed(&self, key: &str) -> Result<Value> {
        let track = {
            let guard = self.inner.computed.borrow();
            if let Some(value) = guard.cache.get(key) {
                return Ok(value.clone());
            }
            let Some(entry) = guard.entries.get(key) else {
                return Ok(Value::Undefined);
            };
            if entry.is_computing {
                trace!(key, "computed.read re-entrant");
                return Ok(entry.last_value.clone());
            }
            !entry.tracked
        };
        self.run_compute(key, track)
    }

    fn run_compute(&self, key: &str, track: bool) -> Result<Value> {
        let compute = {
            let mut engine = self.inner.computed.borrow_mut();
            let Some(entry) = engine.entries.get_mut(key) else {
                return Ok(Value::Undefined);
            };
            entry.is_computing = true;
            Rc::clone(&entry.compute)
        };

        let depth = {
            let mut tracking = self.inner.tracking.borrow_mut();
            let depth = tracking.len();
            tracking.push(track.then(|| TrackingFrame::new(key)));
            depth
        };
        let guard = ComputingGuard {
            inner: &self.inner,
            key,
            depth,
        };

        let result = compute(self);
        let frame = self
            .inner
            .tracking
            .borrow_mut()
            .get_mut(depth)
            .and_then(Option::take);
        drop(guard);

        match result {
            Ok(value) => {
                let mut guard = self.inner.computed.borrow_mut();
                let engine = &mut *guard;
                // The entry may have been reset while the function ran.
                if let Some(entry) = engine.entries.get_mut(key) {
                    if let Some(frame) = frame {
                        entry.dependencies = frame.dependencies;
                        entry.tracked = true;
                    }
                    entry.last_value = value.clone();
                    entry.version += 1;
                    engine.cache.insert(key.to_string(), value.clone());
                    trace!(
                        key,
                        version = entry.version,
                        dependencies = entry.dependencies.len(),
                        "computed.recompute"
                    );
                }
                Ok(value)
            }
            Err(source) => {
                warn!(key, error = %source, "computed.failed");
                Err(StateError::computation(key, source))
            }
        }
    }

    /// Drop the cached value of every computed key affected by a change of
    /// `key`. Returns them in recompute order.
    pub(super) fn invalidate_dependents(&self, key: &str) -> Vec<String> {
        let mut engine = self.inner.computed.borrow_mut();
        let order = engine.cascade_order(key);
        for dependent in &order {
            engine.cache.remove(dependent);
        }
        order
    }

    /// Recompute each of `dependents`, notifying its watchers and bound
    /// elements. Keys a watcher already recomputed are served from the cache.
    pub(super) fn recompute_dependents(&self, key: &str, dependents: &[String]) {
        if dependents.is_empty() {
            return;
        }
        debug!(key, dependents = dependents.len(), "computed.cascade");

        for dependent in dependents {
            match self.read_computed(dependent) {
                Ok(value) => {
                    self.notify(dependent, &value, &Value::Undefined);
                    self.push_to_elements(dependent, &value);
                }
                Err(err) => {
                    warn!(key = %dependent, trigger = key, error = %err, "computed.cascade failed");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
