#![forbid(unsafe_code)]
// Log fields compile away without the `tracing` feature.
#![cfg_attr(not(feature = "tracing"), allow(unused_variables))]

//! Runtime for the BWW reactive state engine.
//!
//! ```
//! use bww_runtime::{ReactiveStore, WatchOptions};
//! use bww_core::Value;
//!
//! let store = ReactiveStore::with_initial([("first", "Ada"), ("last", "Byron")]);
//! store
//!     .computed("full", |s| Ok(Value::from(format!("{} {}", s.read("first"), s.read("last")))))
//!     .unwrap();
//!
//! let handle = store.watch("full", |new, _| println!("full = {new}"), WatchOptions::default());
//! store.write("last", "Lovelace");
//! assert_eq!(store.read("full"), Value::from("Ada Lovelace"));
//! handle.unsubscribe();
//! ```

pub mod config;
pub mod error;
pub mod reactive;

pub use config::StoreConfig;
pub use error::{BoxError, Result, StateError};
pub use reactive::{
    BindOptions, ReactiveStore, Unsubscribe, WatchGuard, WatchOptions, WeakStore, WriteOutcome,
};
