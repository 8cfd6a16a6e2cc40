//! Store configuration.
//!
//! [`StoreConfig`] collects the behavioural switches of a
//! [`ReactiveStore`](crate::ReactiveStore). Values come from
//! [`StoreConfig::default`], the builder methods, or environment overrides
//! via [`StoreConfig::from_env`]:
//!
//! | Variable                      | Field                     |
//! |-------------------------------|---------------------------|
//! | `BWW_AUTO_DEFINE`             | `auto_define`             |
//! | `BWW_ISOLATE_CALLBACK_PANICS` | `isolate_callback_panics` |
//! | `BWW_MAX_CASCADE_DEPTH`       | `max_cascade_depth`       |
//! | `BWW_MODEL_ATTRIBUTE`         | `model_attribute`         |

use std::env;

use crate::error::{Result, StateError};

/// Attribute that marks an element for declarative binding.
pub const DEFAULT_MODEL_ATTRIBUTE: &str = "bww-model";

/// Configuration for a [`ReactiveStore`](crate::ReactiveStore).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StoreConfig {
    /// Writing an unknown key defines it (without notification).
    /// When false such writes are rejected.
    /// Default: true.
    pub auto_define: bool,

    /// Run each watcher callback under `catch_unwind` so one panicking
    /// callback does not stop delivery to the rest of the round.
    /// Default: true.
    pub isolate_callback_panics: bool,

    /// Maximum nesting of writes issued from inside callbacks before further
    /// writes are refused. Bounds runaway watcher cycles.
    /// Default: 64.
    pub max_cascade_depth: usize,

    /// Marker attribute scanned by `scan_declarative`.
    /// Default: `bww-model`.
    pub model_attribute: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            auto_define: true,
            isolate_callback_panics: true,
            max_cascade_depth: 64,
            model_attribute: DEFAULT_MODEL_ATTRIBUTE.to_string(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn auto_define(mut self, enabled: bool) -> Self {
        self.auto_define = enabled;
        self
    }

    #[must_use]
    pub fn isolate_callback_panics(mut self, enabled: bool) -> Self {
        self.isolate_callback_panics = enabled;
        self
    }

    #[must_use]
    pub fn max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    #[must_use]
    pub fn model_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.model_attribute = attribute.into();
        self
    }

    /// Defaults overridden by `BWW_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `BWW_*` name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(val) = lookup("BWW_AUTO_DEFINE") {
            config.auto_define = parse_flag("BWW_AUTO_DEFINE", &val)?;
        }
        if let Some(val) = lookup("BWW_ISOLATE_CALLBACK_PANICS") {
            config.isolate_callback_panics = parse_flag("BWW_ISOLATE_CALLBACK_PANICS", &val)?;
        }
        if let Some(val) = lookup("BWW_MAX_CASCADE_DEPTH") {
            config.max_cascade_depth = val.trim().parse().map_err(|_| {
                StateError::invalid_config(format!(
                    "BWW_MAX_CASCADE_DEPTH must be a non-negative integer, got {val:?}"
                ))
            })?;
        }
        if let Some(val) = lookup("BWW_MODEL_ATTRIBUTE") {
            let val = val.trim();
            if val.is_empty() {
                return Err(StateError::invalid_config(
                    "BWW_MODEL_ATTRIBUTE must not be empty",
                ));
            }
            config.model_attribute = val.to_string();
        }

        Ok(config)
    }
}

fn parse_flag(name: &str, val: &str) -> Result<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StateError::invalid_config(format!(
            "{name} must be a boolean, got {val:?}"
        ))),
    }
}
