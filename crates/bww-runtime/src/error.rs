use thiserror::Error;

/// Error type returned by user-supplied computation functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("computation of `{key}` failed: {source}")]
    ComputationFailed {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("key `{key}` already holds a plain value and cannot become computed")]
    KeyConflict { key: String },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl StateError {
    #[must_use]
    pub fn computation(key: impl Into<String>, source: BoxError) -> Self {
        Self::ComputationFailed {
            key: key.into(),
            source,
        }
    }

    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// The key the error concerns, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::ComputationFailed { key, .. } | Self::KeyConflict { key } => Some(key),
            Self::InvalidConfig { .. } => None,
        }
    }
}
