#![forbid(unsafe_code)]

//! The reactive engine.
//!
//! - [`ReactiveStore`]: the key/value store, with equality-gated writes.
//! - [`watcher`]: per-key change callbacks and their [`Unsubscribe`] handles.
//! - [`computed`]: cached derived keys with dependency discovery.
//! - [`binding`]: two-way synchronization with host UI elements.
//!
//! All four live behind one `Rc` handle and share a single thread.
//!
//! # Invariants
//!
//! 1. Within one changing write the order is always: watchers of the key,
//!    then dependent computed keys, then bound elements.
//! 2. Watchers are notified in subscription order.
//! 3. A write of a strictly equal value has no effect at all.

pub mod binding;
pub mod computed;
pub mod store;
pub mod watcher;

pub use binding::BindOptions;
pub use computed::ComputeFn;
pub use store::{ReactiveStore, WeakStore, WriteOutcome};
pub use watcher::{Unsubscribe, WatchCallback, WatchGuard, WatchOptions, WatcherId};
