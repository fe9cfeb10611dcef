//! Store error types.

/// Errors produced by [`DocumentStore`](crate::DocumentStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The named container does not exist.
    #[error("container '{0}' not found")]
    ContainerNotFound(String),

    /// No document with the given id / partition key exists.
    #[error("document '{id}' not found in container '{container}'")]
    NotFound { container: String, id: String },

    /// The request was malformed (missing id, wrong shape).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The store rejected the request due to request-rate limits.
    #[error("request throttled (retry after {retry_after_ms:?} ms)")]
    Throttled { retry_after_ms: Option<u64> },

    /// Network, auth or service-side failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File-system I/O failure (snapshot load/save).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
