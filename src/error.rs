//! Error types for the Child Resource Operator

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error that does not map onto a store error kind
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource absent from the store
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Create rejected because the resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic-concurrency violation on write
    #[error("Conflict writing {0}: the object has been modified since it was read")]
    Conflict(String),

    /// Snapshot annotation cannot be decoded
    #[error("Malformed snapshot on {key}: {reason}")]
    Malformed { key: String, reason: String },

    /// Transport or backing-store failure
    #[error("Resource store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a malformed-snapshot error
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Malformed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Map a Kubernetes API error onto a store error kind for `key`
    pub fn from_kube(err: kube::Error, key: &str) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(key.to_string()),
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                Error::AlreadyExists(key.to_string())
            }
            kube::Error::Api(resp) if resp.code == 409 => Error::Conflict(key.to_string()),
            kube::Error::Api(resp) if resp.code >= 500 => {
                Error::StoreUnavailable(format!("{}: {}", key, resp.message))
            }
            kube::Error::HyperError(e) => Error::StoreUnavailable(format!("{}: {}", key, e)),
            kube::Error::Service(e) => Error::StoreUnavailable(format!("{}: {}", key, e)),
            other => Error::Kube(other),
        }
    }
}
