use shared::{domain::CollectionPath, error::StoreError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The store cannot be reached: session not ready, unresolvable path, or misconfiguration.
    #[error("synchronization unavailable: {0}")]
    AdapterUnavailable(String),
    /// A live subscription reported a failure. Non-fatal; the cached records stay authoritative.
    #[error("sync error on {path}: {source}")]
    SyncError {
        path: CollectionPath,
        #[source]
        source: StoreError,
    },
    #[error("validation rejected: {0}")]
    ValidationRejected(String),
    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition { from: String, to: String },
    #[error("mutation failed: {0}")]
    MutationFailed(#[source] StoreError),
}

impl EngineError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::AdapterUnavailable(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::ValidationRejected(message.into())
    }
}
