#![forbid(unsafe_code)]

//! BWW reactive state public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use bww_core::Value;
pub use bww_runtime::{
    BindOptions, ReactiveStore, StateError, StoreConfig, Unsubscribe, WatchOptions, WriteOutcome,
};

pub mod prelude {
    pub use bww_core as core;
    pub use bww_runtime as runtime;

    pub use bww_core::{DomEvent, Element, ElementKind, ElementScope, Value};
    pub use bww_runtime::{
        BindOptions, ReactiveStore, StoreConfig, Unsubscribe, WatchOptions, WeakStore,
        WriteOutcome,
    };
}
