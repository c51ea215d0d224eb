//! Error types for the sync engine.

use thiserror::Error;

/// Main error type for sync operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The query is neither a path, a well-formed descriptor, nor a list of those.
    #[error("Invalid query shape: {0}")]
    InvalidQueryShape(String),

    /// A `removed` event arrived for an id that has no registered subscription.
    #[error("Removed entity {id} at {path} was never registered")]
    OrphanRemoval { path: String, id: String },

    /// The remote listener errored or terminated abnormally.
    #[error("Listener at {path} failed: {message}")]
    UpstreamListenerFailure { path: String, message: String },

    /// The entity store rejected a write.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Whether the engine recovers from this error locally and keeps going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::OrphanRemoval { .. })
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
