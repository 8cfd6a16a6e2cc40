#![forbid(unsafe_code)]

//! Per-key watcher registry and notification dispatch.
//!
//! # Design
//!
//! Watchers live in a `Vec` per key, so notification order is subscription
//! order. Dispatch snapshots the list before calling anything: watchers added
//! during a round wait for the next change, and watchers removed during a
//! round are skipped once removed.
//!
//! # Deep watching
//!
//! [`WatchOptions::deep`] is recorded and reported but adds no deliveries.
//! Store values are immutable, so a nested change can only arrive as a new
//! top-level value, which the shallow change gate already reports.
//!
//! # Failure Modes
//!
//! - **Panicking callback**: with `isolate_callback_panics` (the default)
//!   the panic is caught and logged, and the rest of the round is delivered.
//!   Without it the panic unwinds through the writer.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use bww_core::Value;

use bww_core::logging::{debug, error};

use super::store::{ReactiveStore, StoreInner};

/// Watcher callback, invoked with `(new, old)`.
pub type WatchCallback = Rc<dyn Fn(&Value, &Value)>;

/// Identity of one subscription. Never reused within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Delivery options for [`ReactiveStore::watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Call the callback with `(current, undefined)` before `watch` returns.
    pub immediate: bool,
    /// Intent to observe nested changes. See the module docs for its effect.
    pub deep: bool,
}

impl WatchOptions {
    /// Options with `immediate` set.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            immediate: true,
            deep: false,
        }
    }

    #[must_use]
    pub const fn with_deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }
}

struct Watcher {
    id: WatcherId,
    callback: WatchCallback,
    options: WatchOptions,
}

#[derive(Default)]
pub(crate) struct WatcherRegistry {
    by_key: HashMap<String, Vec<Watcher>>,
    next_id: u64,
}

impl WatcherRegistry {
    pub(crate) fn ensure_key(&mut self, key: &str) {
        if !self.by_key.contains_key(key) {
            self.by_key.insert(key.to_string(), Vec::new());
        }
    }

    fn add(&mut self, key: &str, callback: WatchCallback, options: WatchOptions) -> WatcherId {
        self.next_id += 1;
        let id = WatcherId(self.next_id);
        self.by_key.entry(key.to_string()).or_default().push(Watcher {
            id,
            callback,
            options,
        });
        id
    }

    fn remove(&mut self, key: &str, id: WatcherId) -> bool {
        let Some(watchers) = self.by_key.get_mut(key) else {
            return false;
        };
        let before = watchers.len();
        watchers.retain(|w| w.id != id);
        watchers.len() != before
    }

    fn contains(&self, key: &str, id: WatcherId) -> bool {
        self.by_key
            .get(key)
            .is_some_and(|watchers| watchers.iter().any(|w| w.id == id))
    }

    fn snapshot(&self, key: &str) -> Vec<(WatcherId, WatchCallback, WatchOptions)> {
        self.by_key
            .get(key)
            .map(|watchers| {
                watchers
                    .iter()
                    .map(|w| (w.id, Rc::clone(&w.callback), w.options))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop the key's watcher set. Returns how many watchers it held.
    pub(crate) fn remove_key(&mut self, key: &str) -> usize {
        self.by_key.remove(key).map_or(0, |watchers| watchers.len())
    }

    pub(crate) fn clear(&mut self) {
        // Ids keep counting so stale handles can never match new watchers.
        self.by_key.clear();
    }

    pub(crate) fn count(&self, key: &str) -> usize {
        self.by_key.get(key).map_or(0, Vec::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }
}

/// Handle returned by [`ReactiveStore::watch`].
///
/// Dropping the handle leaves the watcher registered; call
/// [`unsubscribe`](Self::unsubscribe), or convert it with
/// [`into_guard`](Self::into_guard) to unsubscribe on drop.
#[must_use = "dropping the handle does not unsubscribe; keep it to remove the watcher later"]
pub struct Unsubscribe {
    store: Weak<StoreInner>,
    key: String,
    id: WatcherId,
    options: WatchOptions,
}

impl Unsubscribe {
    /// Remove the watcher. Calling this again, or after the key or the whole
    /// store was reset, does nothing.
    pub fn unsubscribe(&self) {
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        let removed = inner.watchers.borrow_mut().remove(&self.key, self.id);
        if removed {
            debug!(key = %self.key, watcher = self.id.raw(), "watch.unsubscribe");
        }
    }

    /// Whether the watcher is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.store
            .upgrade()
            .is_some_and(|inner| inner.watchers.borrow().contains(&self.key, self.id))
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.id
    }

    #[must_use]
    pub fn options(&self) -> WatchOptions {
        self.options
    }

    /// Turn the handle into an RAII guard that unsubscribes when dropped.
    pub fn into_guard(self) -> WatchGuard {
        WatchGuard { handle: self }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("options", &self.options)
            .finish()
    }
}

/// RAII guard for a watcher: dropping it unsubscribes.
#[must_use = "dropping the guard unsubscribes immediately"]
#[derive(Debug)]
pub struct WatchGuard {
    handle: Unsubscribe,
}

impl WatchGuard {
    #[must_use]
    pub fn handle(&self) -> &Unsubscribe {
        &self.handle
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

impl ReactiveStore {
    /// Subscribe `callback` to changes of `key`.
    ///
    /// The key does not need to exist yet. With `immediate`, the callback is
    /// called once with `(current, undefined)` before this returns.
    pub fn watch<F>(
        &self,
        key: impl Into<String>,
        callback: F,
        options: WatchOptions,
    ) -> Unsubscribe
    where
        F: Fn(&Value, &Value) + 'static,
    {
        let key = key.into();
        let callback: WatchCallback = Rc::new(callback);
        let id = self
            .inner
            .watchers
            .borrow_mut()
            .add(&key, Rc::clone(&callback), options);
        debug!(
            key = %key,
            watcher = id.raw(),
            immediate = options.immediate,
            deep = options.deep,
            "watch.subscribe"
        );

        if options.immediate {
            let current = self.read(&key);
            self.invoke_watcher(&key, id, &callback, &current, &Value::Undefined);
        }

        Unsubscribe {
            store: Rc::downgrade(&self.inner),
            key,
            id,
            options,
        }
    }

    /// Number of watchers currently registered for `key`.
    #[must_use]
    pub fn watcher_count(&self, key: &str) -> usize {
        self.inner.watchers.borrow().count(key)
    }

    /// Call every watcher of `key` with `(new, old)`, in subscription order.
    pub fn notify(&self, key: &str, new: &Value, old: &Value) {
        let round = self.inner.watchers.borrow().snapshot(key);
        for (id, callback, _options) in round {
            if !self.inner.watchers.borrow().contains(key, id) {
                continue;
            }
            self.invoke_watcher(key, id, &callback, new, old);
        }
    }

    fn invoke_watcher(
        &self,
        key: &str,
        id: WatcherId,
        callback: &WatchCallback,
        new: &Value,
        old: &Value,
    ) {
        self.untracked(|| {
            if !self.inner.config.isolate_callback_panics {
                callback(new, old);
                return;
            }
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(new, old))) {
                let message = panic_message(payload.as_ref());
                error!(key, watcher = id.raw(), panic = %message, "watch.callback_panicked");
            }
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
