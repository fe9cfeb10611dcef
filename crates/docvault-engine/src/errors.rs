//! Engine error model.

use docvault_store::StoreError;

/// The store call that failed, for error context and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    OpenQuery,
    FetchPage,
    Upsert,
    Replace,
    PointQuery,
}

impl std::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OpenQuery => "open query",
            Self::FetchPage => "page fetch",
            Self::Upsert => "upsert",
            Self::Replace => "replace",
            Self::PointQuery => "point query",
        };
        f.write_str(s)
    }
}

/// Errors that end a run (or, in multi mode, a single document task).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Cursor advanced before `open`. Programming error.
    #[error("cursor used before it was opened")]
    NotInitialized,

    /// Cursor advanced after it reported its final page.
    #[error("cursor advanced after its final page")]
    CursorExhausted,

    /// Any store I/O failure. Not retried at this layer.
    #[error("{operation} failed: {source}")]
    Upstream {
        operation: StoreOperation,
        #[source]
        source: StoreError,
    },

    /// Run mode is neither `single` nor `multi`.
    #[error("invalid run mode '{0}', expected 'single' or 'multi'")]
    InvalidRunMode(String),

    #[error("page size must be at least 1")]
    InvalidPageSize,

    /// Source document lacks an `id` or its partition-key value.
    #[error("document #{ordinal} is invalid: {reason}")]
    InvalidDocument { ordinal: u64, reason: String },

    /// A spawned document task panicked or was cancelled.
    #[error("document task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    /// Adapter for `map_err` on store calls.
    pub(crate) fn upstream(operation: StoreOperation) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Upstream { operation, source }
    }

    /// Returns `true` for configuration errors raised before any I/O.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::InvalidRunMode(_) | Self::InvalidPageSize)
    }

    /// Returns the underlying store error for `Upstream` failures.
    #[must_use]
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Upstream { source, .. } => Some(source),
            _ => None,
        }
    }
}
