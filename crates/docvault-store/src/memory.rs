//! In-memory implementation of [`DocumentStore`].
//!
//! Containers live behind a single `Mutex`. The store can be persisted to
//! and restored from a JSON snapshot file, which is how the CLI uses it.
//!
//! Query text is not parsed. Every bound parameter `@field` is treated as an
//! equality predicate on the top-level document field `field`; a query with
//! no parameters matches every document in the container.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use docvault_types::document::{document_id, partition_key_value};
use docvault_types::{ContainerName, Document, QuerySpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{
    DocumentCursor, DocumentStore, FetchedPage, PointQueryResponse, WriteResponse,
};
use crate::error::{self, StoreError};

/// Charge for a page fetch, before the per-document component.
pub const PAGE_BASE_CHARGE: f64 = 1.0;
/// Additional charge per document returned in a page.
pub const PAGE_DOCUMENT_CHARGE: f64 = 0.1;
pub const UPSERT_CHARGE: f64 = 5.0;
pub const REPLACE_CHARGE: f64 = 10.0;
pub const POINT_QUERY_CHARGE: f64 = 2.5;

type WriteFault = Box<dyn Fn(&ContainerName, &Document) -> bool + Send + Sync>;
type QueryFault = Box<dyn Fn(&ContainerName, &QuerySpec) -> bool + Send + Sync>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ContainerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    partition_key: Option<String>,
    #[serde(default)]
    documents: Vec<Document>,
}

impl ContainerData {
    fn position(&self, id: &str, partition_key: Option<&Value>) -> Option<usize> {
        self.documents.iter().position(|doc| {
            document_id(doc) == Some(id)
                && match (&self.partition_key, partition_key) {
                    (Some(field), Some(pk)) => partition_key_value(doc, field) == Some(pk),
                    (Some(field), None) => partition_key_value(doc, field).is_none(),
                    (None, _) => true,
                }
        })
    }
}

/// Serialized snapshot layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    containers: BTreeMap<String, ContainerData>,
}

#[derive(Default)]
struct Faults {
    upsert: Option<WriteFault>,
    replace: Option<WriteFault>,
    point_query: Option<QueryFault>,
    fetch_page: Option<u64>,
}

struct Inner {
    containers: Mutex<BTreeMap<String, ContainerData>>,
    faults: Mutex<Faults>,
    calls: AtomicU64,
    fetches: AtomicU64,
}

/// Snapshot-backed in-memory document store.
///
/// Cheap to clone; clones share the same containers.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with no containers.
    #[must_use]
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(Inner {
                containers: Mutex::new(snapshot.containers),
                faults: Mutex::new(Faults::default()),
                calls: AtomicU64::new(0),
                fetches: AtomicU64::new(0),
            }),
        }
    }

    /// Load a store from a JSON snapshot file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file can't be read, or
    /// [`StoreError::Serialization`] if it isn't a valid snapshot.
    pub fn load(path: &Path) -> error::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        tracing::debug!(
            path = %path.display(),
            containers = snapshot.containers.len(),
            "Loaded store snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write every container to a JSON snapshot file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file or its directory can't be
    /// written.
    pub fn save(&self, path: &Path) -> error::Result<()> {
        let snapshot = Snapshot {
            containers: self.lock_containers()?.clone(),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Create `container` (no-op if it exists). `partition_key` names the
    /// field used together with `id` to address documents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the store lock is poisoned.
    pub fn create_container(
        &self,
        container: &ContainerName,
        partition_key: Option<&str>,
    ) -> error::Result<()> {
        self.lock_containers()?
            .entry(container.as_str().to_string())
            .or_insert_with(|| ContainerData {
                partition_key: partition_key.map(str::to_string),
                documents: Vec::new(),
            });
        Ok(())
    }

    /// Append documents to an existing container without charging or counting calls.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ContainerNotFound`] if the container doesn't exist.
    pub fn seed(
        &self,
        container: &ContainerName,
        documents: impl IntoIterator<Item = Document>,
    ) -> error::Result<()> {
        let mut containers = self.lock_containers()?;
        let data = containers
            .get_mut(container.as_str())
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        data.documents.extend(documents);
        Ok(())
    }

    /// Copy of every document in `container`, in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ContainerNotFound`] if the container doesn't exist.
    pub fn documents(&self, container: &ContainerName) -> error::Result<Vec<Document>> {
        self.lock_containers()?
            .get(container.as_str())
            .map(|data| data.documents.clone())
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))
    }

    /// Total number of store operations issued (queries, fetches, writes).
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Number of page fetches issued across all cursors.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// Fail every upsert whose target container and document match `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the fault lock is poisoned.
    pub fn fail_upserts_when<F>(&self, predicate: F) -> error::Result<()>
    where
        F: Fn(&ContainerName, &Document) -> bool + Send + Sync + 'static,
    {
        self.lock_faults()?.upsert = Some(Box::new(predicate));
        Ok(())
    }

    /// Fail every replace whose target container and new document match `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the fault lock is poisoned.
    pub fn fail_replaces_when<F>(&self, predicate: F) -> error::Result<()>
    where
        F: Fn(&ContainerName, &Document) -> bool + Send + Sync + 'static,
    {
        self.lock_faults()?.replace = Some(Box::new(predicate));
        Ok(())
    }

    /// Fail every point query whose container and query match `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the fault lock is poisoned.
    pub fn fail_point_queries_when<F>(&self, predicate: F) -> error::Result<()>
    where
        F: Fn(&ContainerName, &QuerySpec) -> bool + Send + Sync + 'static,
    {
        self.lock_faults()?.point_query = Some(Box::new(predicate));
        Ok(())
    }

    /// Fail the `page`-th fetch (1-based, counted per store) of any cursor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the fault lock is poisoned.
    pub fn fail_fetch_of_page(&self, page: u64) -> error::Result<()> {
        self.lock_faults()?.fetch_page = Some(page);
        Ok(())
    }

    fn lock_containers(&self) -> error::Result<MutexGuard<'_, BTreeMap<String, ContainerData>>> {
        self.inner
            .containers
            .lock()
            .map_err(|_| StoreError::LockPoisoned)
    }

    fn lock_faults(&self) -> error::Result<MutexGuard<'_, Faults>> {
        self.inner.faults.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn count_call(&self) {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Whether `doc` satisfies every `@field` equality predicate in `query`.
fn matches_query(doc: &Document, query: &QuerySpec) -> bool {
    query.parameters.iter().all(|param| {
        let field = param.name.strip_prefix('@').unwrap_or(&param.name);
        doc.get(field) == Some(&param.value)
    })
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn query_container(
        &self,
        container: &ContainerName,
        query: &QuerySpec,
        page_size: u32,
    ) -> error::Result<Box<dyn DocumentCursor>> {
        self.count_call();
        if page_size == 0 {
            return Err(StoreError::BadRequest("page size must be positive".into()));
        }
        Ok(Box::new(MemoryCursor {
            store: self.clone(),
            container: container.clone(),
            query: query.clone(),
            page_size: page_size as usize,
            matched: None,
            position: 0,
        }))
    }

    async fn upsert(
        &self,
        container: &ContainerName,
        document: &Document,
    ) -> error::Result<WriteResponse> {
        self.count_call();
        {
            let faults = self.lock_faults()?;
            if faults
                .upsert
                .as_ref()
                .is_some_and(|fails| fails(container, document))
            {
                return Err(StoreError::Unavailable(format!(
                    "injected upsert failure for '{}'",
                    document_id(document).unwrap_or("<no id>")
                )));
            }
        }

        let id = document_id(document)
            .ok_or_else(|| StoreError::BadRequest("document has no string 'id'".into()))?;
        let mut containers = self.lock_containers()?;
        let data = containers
            .get_mut(container.as_str())
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        let pk = data
            .partition_key
            .as_deref()
            .and_then(|field| partition_key_value(document, field))
            .cloned();
        match data.position(id, pk.as_ref()) {
            Some(idx) => data.documents[idx] = document.clone(),
            None => data.documents.push(document.clone()),
        }
        Ok(WriteResponse {
            request_charge: UPSERT_CHARGE,
        })
    }

    async fn replace(
        &self,
        container: &ContainerName,
        id: &str,
        partition_key: &Value,
        document: &Document,
    ) -> error::Result<WriteResponse> {
        self.count_call();
        if self
            .lock_faults()?
            .replace
            .as_ref()
            .is_some_and(|fails| fails(container, document))
        {
            return Err(StoreError::Unavailable(format!(
                "injected replace failure for '{id}'"
            )));
        }
        let mut containers = self.lock_containers()?;
        let data = containers
            .get_mut(container.as_str())
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        let idx = data
            .position(id, Some(partition_key))
            .ok_or_else(|| StoreError::NotFound {
                container: container.to_string(),
                id: id.to_string(),
            })?;
        data.documents[idx] = document.clone();
        Ok(WriteResponse {
            request_charge: REPLACE_CHARGE,
        })
    }

    async fn point_query(
        &self,
        container: &ContainerName,
        query: &QuerySpec,
    ) -> error::Result<PointQueryResponse> {
        self.count_call();
        if self
            .lock_faults()?
            .point_query
            .as_ref()
            .is_some_and(|fails| fails(container, query))
        {
            return Err(StoreError::Throttled {
                retry_after_ms: Some(100),
            });
        }
        let containers = self.lock_containers()?;
        let data = containers
            .get(container.as_str())
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        let count = data
            .documents
            .iter()
            .filter(|doc| matches_query(doc, query))
            .count();
        Ok(PointQueryResponse {
            value: Some(Value::from(count)),
            request_charge: POINT_QUERY_CHARGE,
        })
    }

    async fn container_exists(&self, container: &ContainerName) -> error::Result<bool> {
        self.count_call();
        Ok(self.lock_containers()?.contains_key(container.as_str()))
    }
}

/// Cursor over a [`MemoryStore`] container.
///
/// The matching result set is captured on the first fetch, so writes made
/// while paging (replacements, backups into the same container) do not
/// shift later pages.
struct MemoryCursor {
    store: MemoryStore,
    container: ContainerName,
    query: QuerySpec,
    page_size: usize,
    matched: Option<Vec<Document>>,
    position: usize,
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn next_page(&mut self) -> error::Result<FetchedPage> {
        self.store.count_call();
        let fetch_number = self.store.inner.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.store.lock_faults()?.fetch_page == Some(fetch_number) {
            return Err(StoreError::Unavailable(format!(
                "injected failure on page fetch {fetch_number}"
            )));
        }

        if self.matched.is_none() {
            let containers = self.store.lock_containers()?;
            let data = containers
                .get(self.container.as_str())
                .ok_or_else(|| StoreError::ContainerNotFound(self.container.to_string()))?;
            self.matched = Some(
                data.documents
                    .iter()
                    .filter(|doc| matches_query(doc, &self.query))
                    .cloned()
                    .collect(),
            );
        }
        let matched = self.matched.as_deref().unwrap_or_default();

        let end = (self.position + self.page_size).min(matched.len());
        let documents = matched[self.position..end].to_vec();
        self.position = end;

        #[allow(clippy::cast_precision_loss)]
        let request_charge = PAGE_BASE_CHARGE + PAGE_DOCUMENT_CHARGE * documents.len() as f64;
        Ok(FetchedPage {
            has_more: self.position < matched.len(),
            documents,
            request_charge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    fn store_with_orders(n: usize) -> (MemoryStore, ContainerName) {
        let store = MemoryStore::new();
        let orders = ContainerName::new("orders");
        store.create_container(&orders, Some("tenant")).unwrap();
        store
            .seed(
                &orders,
                (1..=n).map(|i| doc(json!({"id": format!("d{i}"), "tenant": "acme", "n": i}))),
            )
            .unwrap();
        (store, orders)
    }

    #[tokio::test]
    async fn cursor_pages_until_exhausted() {
        let (store, orders) = store_with_orders(5);
        let mut cursor = store
            .query_container(&orders, &QuerySpec::new("SELECT * FROM c"), 2)
            .unwrap();

        let sizes_and_more: Vec<(usize, bool)> = {
            let mut out = Vec::new();
            loop {
                let page = cursor.next_page().await.unwrap();
                out.push((page.documents.len(), page.has_more));
                if !page.has_more {
                    break;
                }
            }
            out
        };
        assert_eq!(sizes_and_more, vec![(2, true), (2, true), (1, false)]);
        assert_eq!(store.fetch_count(), 3);
    }

    #[tokio::test]
    async fn empty_container_yields_single_terminal_page() {
        let (store, orders) = store_with_orders(0);
        let mut cursor = store
            .query_container(&orders, &QuerySpec::new("SELECT * FROM c"), 10)
            .unwrap();
        let page = cursor.next_page().await.unwrap();
        assert!(page.documents.is_empty());
        assert!(!page.has_more);
        assert!((page.request_charge - PAGE_BASE_CHARGE).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn parameters_filter_by_field_equality() {
        let (store, orders) = store_with_orders(4);
        let query = QuerySpec::new("SELECT * FROM c WHERE c.n = @n").with_parameter("@n", 3);
        let mut cursor = store.query_container(&orders, &query, 10).unwrap();
        let page = cursor.next_page().await.unwrap();
        assert_eq!(page.documents.len(), 1);
        assert_eq!(document_id(&page.documents[0]), Some("d3"));
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id_and_partition_key() {
        let (store, orders) = store_with_orders(1);
        store
            .upsert(&orders, &doc(json!({"id": "d1", "tenant": "acme", "n": 99})))
            .await
            .unwrap();
        store
            .upsert(&orders, &doc(json!({"id": "d1", "tenant": "other", "n": 1})))
            .await
            .unwrap();
        let docs = store.documents(&orders).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["n"], json!(99));
    }

    #[tokio::test]
    async fn replace_missing_document_is_not_found() {
        let (store, orders) = store_with_orders(1);
        let err = store
            .replace(&orders, "d1", &json!("nope"), &doc(json!({"id": "d1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn point_query_counts_matches() {
        let (store, orders) = store_with_orders(3);
        let q = QuerySpec::new("SELECT VALUE COUNT(1) FROM c WHERE c.tenant = @tenant")
            .with_parameter("@tenant", "acme");
        let resp = store.point_query(&orders, &q).await.unwrap();
        assert_eq!(resp.value, Some(json!(3)));
    }

    #[tokio::test]
    async fn missing_container_surfaces_on_first_fetch() {
        let store = MemoryStore::new();
        let mut cursor = store
            .query_container(&ContainerName::new("ghost"), &QuerySpec::default(), 5)
            .unwrap();
        let err = cursor.next_page().await.unwrap_err();
        assert!(matches!(err, StoreError::ContainerNotFound(_)));
    }

    #[tokio::test]
    async fn injected_upsert_fault_fires_only_for_matches() {
        let (store, orders) = store_with_orders(0);
        store
            .fail_upserts_when(|_, d| document_id(d) == Some("bad"))
            .unwrap();
        assert!(store
            .upsert(&orders, &doc(json!({"id": "bad", "tenant": "acme"})))
            .await
            .is_err());
        assert!(store
            .upsert(&orders, &doc(json!({"id": "good", "tenant": "acme"})))
            .await
            .is_ok());
        assert_eq!(store.documents(&orders).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn injected_replace_and_point_query_faults() {
        let (store, orders) = store_with_orders(1);
        store.fail_replaces_when(|_, d| d.get("n") == Some(&json!(0))).unwrap();
        store.fail_point_queries_when(|c, _| c.as_str() == "orders").unwrap();

        let err = store
            .replace(
                &orders,
                "d1",
                &json!("acme"),
                &doc(json!({"id": "d1", "tenant": "acme", "n": 0})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.documents(&orders).unwrap()[0]["n"], json!(1));

        let err = store
            .point_query(&orders, &QuerySpec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Throttled { .. }));
        assert_eq!(store.call_count(), 2);
    }

    #[test]
    fn snapshot_round_trips_through_file() {
        let (store, orders) = store_with_orders(2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        store.save(&path).unwrap();

        let loaded = MemoryStore::load(&path).unwrap();
        assert_eq!(loaded.documents(&orders).unwrap(), store.documents(&orders).unwrap());
        assert_eq!(loaded.call_count(), 0);
    }

    #[test]
    fn load_rejects_malformed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            MemoryStore::load(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
