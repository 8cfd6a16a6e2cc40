#![forbid(unsafe_code)]

//! The reactive key/value store.
//!
//! # Design
//!
//! [`ReactiveStore`] is a cheap, cloneable handle to shared single-threaded
//! state (`Rc<StoreInner>`). The four maps it owns (values, watchers,
//! computed entries, bindings) each sit in their own `RefCell`, and no
//! borrow is ever held while user code runs. Callbacks, computation
//! functions and element listeners may therefore call back into the store,
//! including writing to it.
//!
//! A changing [`write`](ReactiveStore::write) runs, in order:
//!
//! 1. drop the cached value of every computed key that depends on it,
//! 2. notify the key's watchers with `(new, old)`,
//! 3. recompute those computed keys and notify their watchers,
//! 4. push the value into bound elements that display something else.
//!
//! Watchers and element pushes run untracked: reads they make are never
//! recorded as dependencies of a computation that triggered them.
//!
//! # Invariants
//!
//! 1. Every defined key has exactly one current value and a (possibly empty)
//!    watcher set.
//! 2. Writing a value that is strictly equal to the current one has no
//!    observable effect.
//! 3. First writes define a key silently (when `auto_define` is on).
//! 4. `reset_all` leaves no values, watchers, bindings or computed entries.
//!
//! # Failure Modes
//!
//! - **Runaway cascade**: watchers that keep writing to each other are cut
//!   off at `max_cascade_depth`; the refused write reports
//!   [`WriteOutcome::DepthExceeded`].
//! - **Reset during a cascade**: in-flight notifications finish against the
//!   snapshot they started with; removed watchers are skipped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bww_core::Value;
use indexmap::IndexMap;

use bww_core::logging::{debug, trace, warn};

use super::binding::BindingRegistry;
use super::computed::{ComputedEngine, TrackingFrame};
use super::watcher::WatcherRegistry;
use crate::config::StoreConfig;
use crate::error::Result;

/// What a [`ReactiveStore::write`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The key was unknown and has been defined. Nothing was notified.
    Defined,
    /// The value was strictly equal to the current one.
    Unchanged,
    /// The value was committed and propagated.
    Changed,
    /// The key was unknown and `auto_define` is off.
    Rejected,
    /// The key is computed; its value cannot be assigned.
    ReadOnly,
    /// The write was nested too deeply inside other writes' callbacks.
    DepthExceeded,
}

impl WriteOutcome {
    /// Whether watchers, computed dependents and bindings were updated.
    #[must_use]
    pub const fn is_change(self) -> bool {
        matches!(self, Self::Changed)
    }
}

/// Shared interior of a [`ReactiveStore`].
pub(crate) struct StoreInner {
    pub(super) config: StoreConfig,
    pub(super) state: RefCell<IndexMap<String, Value>>,
    pub(super) watchers: RefCell<WatcherRegistry>,
    pub(super) computed: RefCell<ComputedEngine>,
    pub(super) bindings: RefCell<BindingRegistry>,
    /// One frame per running computation; `None` frames are untracked.
    pub(super) tracking: RefCell<Vec<Option<TrackingFrame>>>,
    /// Number of changing writes currently propagating.
    cascade_depth: Cell<usize>,
}

impl StoreInner {
    fn enter_cascade(&self) -> Option<CascadeGuard<'_>> {
        let depth = self.cascade_depth.get();
        if depth > self.config.max_cascade_depth {
            return None;
        }
        self.cascade_depth.set(depth + 1);
        Some(CascadeGuard {
            depth: &self.cascade_depth,
        })
    }
}

/// Decrements the cascade depth when a changing write finishes, including
/// by unwinding.
struct CascadeGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for CascadeGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// A reactive key/value store.
///
/// Cloning a `ReactiveStore` creates a new handle to the **same** state.
/// Callbacks that need the store should capture a [`WeakStore`] from
/// [`downgrade`](Self::downgrade) to avoid keeping it alive through a cycle.
#[derive(Clone)]
pub struct ReactiveStore {
    pub(crate) inner: Rc<StoreInner>,
}

/// Non-owning handle to a [`ReactiveStore`].
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    /// The store, if any strong handle is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<ReactiveStore> {
        self.inner.upgrade().map(|inner| ReactiveStore { inner })
    }
}

impl fmt::Debug for WeakStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStore")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl fmt::Debug for ReactiveStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveStore")
            .field("keys", &self.inner.state.borrow().len())
            .field("computed", &self.inner.computed.borrow().len())
            .field("watchers", &self.inner.watchers.borrow().total())
            .field("bindings", &self.inner.bindings.borrow().total())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Default for ReactiveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveStore {
    /// Create an empty store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                config,
                state: RefCell::new(IndexMap::new()),
                watchers: RefCell::new(WatcherRegistry::default()),
                computed: RefCell::new(ComputedEngine::default()),
                bindings: RefCell::new(BindingRegistry::default()),
                tracking: RefCell::new(Vec::new()),
                cascade_depth: Cell::new(0),
            }),
        }
    }

    /// Create a store and define each of `entries`, in order.
    #[must_use]
    pub fn with_initial<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let store = Self::new();
        for (key, value) in entries {
            store.define(key, value);
        }
        store
    }

    /// Create a store from `BWW_*` environment overrides.
    pub fn from_env() -> Result<Self> {
        StoreConfig::from_env().map(Self::with_config)
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Define `key` with `value`.
    ///
    /// Defining is not a change: nothing is notified, even when an existing
    /// key's value is replaced. Returns true if the key was new. Computed
    /// keys cannot be redefined as plain ones; that returns false.
    pub fn define(&self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if self.is_computed(&key) {
            warn!(key = %key, "store.define ignored: key is computed");
            return false;
        }
        let newly_defined = self
            .inner
            .state
            .borrow_mut()
            .insert(key.clone(), value.into())
            .is_none();
        self.inner.watchers.borrow_mut().ensure_key(&key);
        debug!(key = %key, newly_defined, "store.define");
        newly_defined
    }

    /// Current value of `key`.
    ///
    /// Computed keys are served from their cache, recomputing on a miss.
    /// Unknown keys and failed computations yield [`Value::Undefined`].
    #[must_use]
    pub fn read(&self, key: &str) -> Value {
        match self.try_read(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "store.read failed");
                Value::Undefined
            }
        }
    }

    /// Like [`read`](Self::read), but surfaces computation failures.
    pub fn try_read(&self, key: &str) -> Result<Value> {
        let plain = self.inner.state.borrow().get(key).cloned();
        if let Some(value) = plain {
            self.track(key);
            return Ok(value);
        }
        if self.is_computed(key) {
            self.track(key);
            return self.read_computed(key);
        }
        trace!(key, "store.read undefined");
        Ok(Value::Undefined)
    }

    /// Assign `value` to `key`. See the module docs for the propagation order.
    pub fn write(&self, key: &str, value: impl Into<Value>) -> WriteOutcome {
        let value = value.into();

        if self.is_computed(key) {
            warn!(key, "store.write refused: key is computed");
            return WriteOutcome::ReadOnly;
        }

        let current = self.inner.state.borrow().get(key).cloned();
        let Some(old) = current else {
            if value.is_undefined() {
                trace!(key, "store.write unchanged: undefined into unknown key");
                return WriteOutcome::Unchanged;
            }
            if !self.inner.config.auto_define {
                warn!(key, "store.write refused: key is undefined");
                return WriteOutcome::Rejected;
            }
            self.define(key, value);
            return WriteOutcome::Defined;
        };

        if old.strict_eq(&value) {
            trace!(key, "store.write unchanged");
            return WriteOutcome::Unchanged;
        }

        let Some(_cascade) = self.inner.enter_cascade() else {
            warn!(
                key,
                max_depth = self.inner.config.max_cascade_depth,
                "store.write refused: cascade depth exceeded"
            );
            return WriteOutcome::DepthExceeded;
        };

        self.inner
            .state
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        debug!(
            key,
            from = old.type_name(),
            to = value.type_name(),
            "store.write"
        );

        // Dependents are dropped before watchers run so that a watcher
        // reading one recomputes it instead of seeing the stale value.
        let dependents = self.invalidate_dependents(key);
        self.notify(key, &value, &old);
        self.recompute_dependents(key, &dependents);

        // A watcher may have written the key again; push what is current.
        let latest = self
            .inner
            .state
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or(value);
        self.push_to_elements(key, &latest);

        WriteOutcome::Changed
    }

    /// Remove `key`, its watchers and its bindings.
    ///
    /// Computed keys that depend on `key` keep their cached value and their
    /// dependency set: they will see `undefined` the next time they are
    /// recomputed, and a later redefinition of `key` followed by a change
    /// invalidates them again. Resetting a computed key drops its watchers
    /// and bindings but keeps the computation. Unknown keys are a no-op.
    pub fn reset_key(&self, key: &str) {
        let removed = self.inner.state.borrow_mut().shift_remove(key).is_some();
        let watchers = self.inner.watchers.borrow_mut().remove_key(key);
        let bindings = self.inner.bindings.borrow_mut().remove_key(key);
        debug!(key, removed, watchers, bindings, "store.reset_key");
    }

    /// Clear every value, watcher, binding and computed entry.
    pub fn reset_all(&self) {
        self.inner.state.borrow_mut().clear();
        self.inner.watchers.borrow_mut().clear();
        self.inner.bindings.borrow_mut().clear();
        self.inner.computed.borrow_mut().clear();
        debug!("store.reset_all");
    }

    /// Whether `key` is defined, as a plain or computed key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.state.borrow().contains_key(key) || self.is_computed(key)
    }

    /// Plain keys in definition order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.state.borrow().keys().cloned().collect()
    }

    /// Number of plain keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().is_empty()
    }

    /// All plain values as an ordered map value.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let state = self.inner.state.borrow();
        Value::Map(Rc::new(state.clone()))
    }

    /// Pretty-printed JSON of every plain key, in definition order.
    ///
    /// Computed keys and `undefined` values are left out. The output is for
    /// diagnostics; it carries no schema version.
    #[must_use]
    pub fn serialize(&self) -> String {
        match serde_json::to_string_pretty(&self.snapshot()) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "store.serialize failed");
                String::from("{}")
            }
        }
    }

    /// Record a read of `key` in the innermost tracked computation.
    fn track(&self, key: &str) {
        let mut tracking = self.inner.tracking.borrow_mut();
        if let Some(Some(frame)) = tracking.last_mut() {
            frame.record(key);
        }
    }

    /// Run `f` with dependency tracking suspended, so reads made by
    /// callbacks a computation triggers are not attributed to it.
    pub(super) fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let depth = {
            let mut tracking = self.inner.tracking.borrow_mut();
            let depth = tracking.len();
            tracking.push(None);
            depth
        };
        let _guard = UntrackedGuard {
            tracking: &self.inner.tracking,
            depth,
        };
        f()
    }
}

/// Pops the untracked frame, including by unwinding.
struct UntrackedGuard<'a> {
    tracking: &'a RefCell<Vec<Option<TrackingFrame>>>,
    depth: usize,
}

impl Drop for UntrackedGuard<'_> {
    fn drop(&mut self) {
        self.tracking.borrow_mut().truncate(self.depth);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
