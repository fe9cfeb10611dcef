//! Paged reads over the source container.

use std::sync::Arc;

use docvault_store::{DocumentCursor, DocumentStore};
use docvault_types::{ContainerName, Document, QuerySpec};

use crate::errors::{EngineError, StoreOperation};

/// One batch of source documents.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub documents: Vec<Document>,
    pub has_more: bool,
    /// Request cost of this single fetch. Must be recorded by the caller,
    /// including for empty pages.
    pub cost: f64,
}

/// Wraps a store cursor for one query against one container.
///
/// `open` must be called before `next`. Once a page with `has_more == false`
/// has been returned the source is terminal until reopened.
pub struct CursorSource {
    store: Arc<dyn DocumentStore>,
    container: ContainerName,
    cursor: Option<Box<dyn DocumentCursor>>,
    exhausted: bool,
}

impl CursorSource {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, container: ContainerName) -> Self {
        Self {
            store,
            container,
            cursor: None,
            exhausted: false,
        }
    }

    /// Open a cursor for `query`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPageSize` for a zero page size, or `Upstream` if the
    /// store refuses the query.
    pub fn open(&mut self, query: &QuerySpec, page_size: u32) -> Result<(), EngineError> {
        if page_size == 0 {
            return Err(EngineError::InvalidPageSize);
        }
        let cursor = self
            .store
            .query_container(&self.container, query, page_size)
            .map_err(EngineError::upstream(StoreOperation::OpenQuery))?;
        tracing::debug!(
            container = %self.container,
            page_size,
            "Opened source cursor"
        );
        self.cursor = Some(cursor);
        self.exhausted = false;
        Ok(())
    }

    /// Fetch the next page.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before `open`, `CursorExhausted` after the
    /// final page, or `Upstream` if the store rejects the fetch.
    pub async fn next(&mut self) -> Result<Page, EngineError> {
        if self.exhausted {
            return Err(EngineError::CursorExhausted);
        }
        let cursor = self.cursor.as_mut().ok_or(EngineError::NotInitialized)?;
        let fetched = cursor
            .next_page()
            .await
            .map_err(EngineError::upstream(StoreOperation::FetchPage))?;
        self.exhausted = !fetched.has_more;
        Ok(Page {
            documents: fetched.documents,
            has_more: fetched.has_more,
            cost: fetched.request_charge,
        })
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
