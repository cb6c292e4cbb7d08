//! Error types for attribute resolution.

use thiserror::Error;

/// Result type for attribute operations.
pub type Result<T> = std::result::Result<T, AttributeRetrievalError>;

/// Failure reported by an external attribute adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("request to {endpoint} timed out after {timeout_ms} ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("adapter {endpoint} failed: {message}")]
    Failed { endpoint: String, message: String },

    #[error("no adapter is available for endpoint {0}")]
    UnknownEndpoint(String),
}

/// Failure of a privilege or policy store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Attributes for an entity could not be resolved.
///
/// Evaluation treats every variant as a request-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeRetrievalError {
    #[error("failed to retrieve attributes for '{identifier}' from {endpoint}: {source}")]
    Adapter {
        endpoint: String,
        identifier: String,
        #[source]
        source: AdapterError,
    },

    /// A previous failure for this identifier is still cached.
    #[error("attribute retrieval for '{identifier}' failed recently and will not be retried until the cache entry expires")]
    DoNotRetry { identifier: String },

    #[error("attributes for '{identifier}' exceed limits: {reason}")]
    LimitExceeded { identifier: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
