#![forbid(unsafe_code)]

//! Core: value model, element contract, and logging shims for BWW state.

pub mod element;
pub mod logging;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod value;

pub use element::{DomEvent, Element, ElementKind, ElementScope, Listener};
pub use value::Value;
