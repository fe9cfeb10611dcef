//! Document store trait definitions.
//!
//! [`DocumentStore`] is the narrow capability the engine needs from a
//! document database: open a paged query, upsert, replace, and run a
//! scalar point query. Retry and timeout policy belong to implementations.

use async_trait::async_trait;
use docvault_types::{ContainerName, Document, QuerySpec};
use serde_json::Value;

use crate::error;

/// One page returned by a cursor advance.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub documents: Vec<Document>,
    /// `false` once the cursor is exhausted.
    pub has_more: bool,
    /// Request cost charged by the store for this fetch.
    pub request_charge: f64,
}

/// Response to an upsert or replace.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteResponse {
    pub request_charge: f64,
}

/// Response to a scalar point query (e.g. `SELECT VALUE COUNT(1) ...`).
#[derive(Debug, Clone, Default)]
pub struct PointQueryResponse {
    /// First scalar result, `None` if the query produced no rows.
    pub value: Option<Value>,
    pub request_charge: f64,
}

/// Server-side continuation over a query's result set.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Fetch the next page.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) if the store rejects the request.
    async fn next_page(&mut self) -> error::Result<FetchedPage>;
}

/// Storage contract for document containers.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn DocumentStore>`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a cursor for `query` over `container`, yielding at most
    /// `page_size` documents per page. No page is fetched until the
    /// cursor is advanced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) if the query cannot be opened.
    fn query_container(
        &self,
        container: &ContainerName,
        query: &QuerySpec,
        page_size: u32,
    ) -> error::Result<Box<dyn DocumentCursor>>;

    /// Insert `document`, or overwrite the document with the same id and
    /// partition key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) on store failure.
    async fn upsert(
        &self,
        container: &ContainerName,
        document: &Document,
    ) -> error::Result<WriteResponse>;

    /// Replace the existing document addressed by `id` and `partition_key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::error::StoreError::NotFound) if
    /// no such document exists, or another variant on store failure.
    async fn replace(
        &self,
        container: &ContainerName,
        id: &str,
        partition_key: &Value,
        document: &Document,
    ) -> error::Result<WriteResponse>;

    /// Run a query expected to produce a single scalar.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) on store failure.
    async fn point_query(
        &self,
        container: &ContainerName,
        query: &QuerySpec,
    ) -> error::Result<PointQueryResponse>;

    /// Whether `container` exists. Used by preflight checks only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) on store failure.
    async fn container_exists(&self, container: &ContainerName) -> error::Result<bool>;
}
