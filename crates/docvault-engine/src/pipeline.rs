//! Per-document stage sequence: backup, verify, replace.
//!
//! Every source document passes through [`DocumentPipeline::process`]
//! exactly once per run:
//!
//! 1. build a backup copy (pure)
//! 2. upsert the backup into the destination
//! 3. clean workflow: confirm the backup is queryable in the destination
//! 4. clean workflow: replace the source with the cleaned document
//!
//! In dry-run mode stages 2-4 log their intent and return `None` without
//! touching the store.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use docvault_store::{DocumentStore, WriteResponse};
use docvault_types::document::{
    document_id, partition_key_value, BACKUP_DATE_FIELD, ID_FIELD, ID_ORIGINAL_FIELD,
    JOB_NAME_FIELD,
};
use docvault_types::{ContainerName, Document, JobName, QuerySpec};
use serde_json::Value;
use uuid::Uuid;

use crate::cleaner::DocumentCleaner;
use crate::controller::Workflow;
use crate::errors::{EngineError, StoreOperation};
use crate::stats::StatsAccumulator;

/// What happened to one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub backed_up: bool,
    /// `None` when verification didn't run (backup workflow, dry run, tester declined).
    pub verified: Option<bool>,
    pub updated: bool,
    pub skipped: bool,
}

/// Build the backup copy of `source`.
///
/// The copy gets a fresh `id` so repeated runs accumulate backups rather than
/// overwrite them, and records the source id, timestamp, and job.
#[must_use]
pub fn build_backup_document(source: &Document, job: &JobName, now: DateTime<Utc>) -> Document {
    let mut backup = source.clone();
    let original_id = source.get(ID_FIELD).cloned().unwrap_or(Value::Null);
    backup.insert(ID_FIELD.into(), Value::String(Uuid::new_v4().to_string()));
    backup.insert(ID_ORIGINAL_FIELD.into(), original_id);
    backup.insert(
        BACKUP_DATE_FIELD.into(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    backup.insert(JOB_NAME_FIELD.into(), Value::String(job.as_str().to_string()));
    backup
}

/// Apply `cleaner` to `source` and restore the addressing fields.
#[must_use]
pub fn build_cleaned_document(
    source: &Document,
    cleaner: &dyn DocumentCleaner,
    job: &JobName,
    partition_key_field: &str,
) -> Document {
    let mut cleaned = cleaner.clean(source);
    for field in [ID_FIELD, partition_key_field] {
        match source.get(field) {
            Some(value) => cleaned.insert(field.to_string(), value.clone()),
            None => cleaned.remove(field),
        };
    }
    cleaned.insert(JOB_NAME_FIELD.into(), Value::String(job.as_str().to_string()));
    cleaned
}

/// Count query for the backup of `id` written by `job`.
#[must_use]
pub fn backup_existence_query(
    id: &str,
    partition_key_field: &str,
    partition_key: &Value,
    job: &JobName,
) -> QuerySpec {
    QuerySpec::new(format!(
        "SELECT VALUE COUNT(1) FROM c WHERE c.{ID_ORIGINAL_FIELD} = @{ID_ORIGINAL_FIELD} \
         AND c.{partition_key_field} = @{partition_key_field} \
         AND c.{JOB_NAME_FIELD} = @{JOB_NAME_FIELD}"
    ))
    .with_parameter(format!("@{ID_ORIGINAL_FIELD}"), id)
    .with_parameter(format!("@{partition_key_field}"), partition_key.clone())
    .with_parameter(format!("@{JOB_NAME_FIELD}"), job.as_str())
}

/// Whether a point-query scalar means "at least one match".
fn scalar_is_positive(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(n)) => n.as_f64().is_some_and(|c| c > 0.0),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

/// Shared, immutable state for every pipeline execution in a run.
pub(crate) struct PipelineContext {
    pub store: Arc<dyn DocumentStore>,
    pub source: ContainerName,
    pub destination: ContainerName,
    pub job: JobName,
    pub partition_key_field: String,
    pub dry_run: bool,
    pub workflow: Workflow,
    pub stats: Arc<StatsAccumulator>,
}

/// Runs the stage sequence for single documents. Cheap to clone; clones
/// share the run context.
#[derive(Clone)]
pub struct DocumentPipeline {
    ctx: Arc<PipelineContext>,
}

impl DocumentPipeline {
    pub(crate) fn new(ctx: PipelineContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    /// Process one source document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDocument` if the document lacks `id` or its partition
    /// key, or `Upstream` if any store call fails. Counters already
    /// incremented for this document stay incremented.
    pub async fn process(
        &self,
        doc: Document,
        ordinal: u64,
    ) -> Result<DocumentOutcome, EngineError> {
        let ctx = &self.ctx;
        let id = document_id(&doc)
            .ok_or_else(|| EngineError::InvalidDocument {
                ordinal,
                reason: "missing string 'id'".into(),
            })?
            .to_string();
        let partition_key = partition_key_value(&doc, &ctx.partition_key_field)
            .cloned()
            .ok_or_else(|| EngineError::InvalidDocument {
                ordinal,
                reason: format!("missing partition key '{}'", ctx.partition_key_field),
            })?;

        ctx.stats.record_examined();
        let mut outcome = DocumentOutcome::default();

        let backup = build_backup_document(&doc, &ctx.job, Utc::now());
        if self.stage_backup(&backup, &id, ordinal).await?.is_some() {
            ctx.stats.record_backup();
            outcome.backed_up = true;
        }

        let Workflow::Clean(cleaner) = &ctx.workflow else {
            return Ok(outcome);
        };

        if !cleaner.should_clean(&doc) {
            tracing::debug!(ordinal, document_id = %id, "Cleaner declined document");
            ctx.stats.record_skipped();
            outcome.skipped = true;
            return Ok(outcome);
        }

        let Some(exists) = self.verify_backup(&id, &partition_key, ordinal).await? else {
            return Ok(outcome);
        };
        ctx.stats.record_verification(exists);
        outcome.verified = Some(exists);
        if !exists {
            tracing::warn!(
                ordinal,
                document_id = %id,
                destination = %ctx.destination,
                "Backup not found in destination, leaving original untouched"
            );
            return Ok(outcome);
        }

        let cleaned =
            build_cleaned_document(&doc, &**cleaner, &ctx.job, &ctx.partition_key_field);
        if self
            .replace_original(&id, &partition_key, &cleaned, ordinal)
            .await?
            .is_some()
        {
            ctx.stats.record_update();
            outcome.updated = true;
        }
        Ok(outcome)
    }

    async fn stage_backup(
        &self,
        backup: &Document,
        id: &str,
        ordinal: u64,
    ) -> Result<Option<WriteResponse>, EngineError> {
        let ctx = &self.ctx;
        if ctx.dry_run {
            tracing::info!(
                ordinal,
                document_id = id,
                destination = %ctx.destination,
                "Dry run: would upsert backup"
            );
            return Ok(None);
        }
        let resp = ctx
            .store
            .upsert(&ctx.destination, backup)
            .await
            .map_err(EngineError::upstream(StoreOperation::Upsert))?;
        ctx.stats.record_cost(resp.request_charge);
        tracing::debug!(
            ordinal,
            document_id = id,
            cost = resp.request_charge,
            "Backup upserted"
        );
        Ok(Some(resp))
    }

    async fn verify_backup(
        &self,
        id: &str,
        partition_key: &Value,
        ordinal: u64,
    ) -> Result<Option<bool>, EngineError> {
        let ctx = &self.ctx;
        if ctx.dry_run {
            tracing::info!(ordinal, document_id = id, "Dry run: would verify backup");
            return Ok(None);
        }
        let query = backup_existence_query(id, &ctx.partition_key_field, partition_key, &ctx.job);
        let resp = ctx
            .store
            .point_query(&ctx.destination, &query)
            .await
            .map_err(EngineError::upstream(StoreOperation::PointQuery))?;
        ctx.stats.record_cost(resp.request_charge);
        Ok(Some(scalar_is_positive(resp.value.as_ref())))
    }

    async fn replace_original(
        &self,
        id: &str,
        partition_key: &Value,
        cleaned: &Document,
        ordinal: u64,
    ) -> Result<Option<WriteResponse>, EngineError> {
        let ctx = &self.ctx;
        if ctx.dry_run {
            tracing::info!(
                ordinal,
                document_id = id,
                source = %ctx.source,
                "Dry run: would replace original"
            );
            return Ok(None);
        }
        let resp = ctx
            .store
            .replace(&ctx.source, id, partition_key, cleaned)
            .await
            .map_err(EngineError::upstream(StoreOperation::Replace))?;
        ctx.stats.record_cost(resp.request_charge);
        tracing::debug!(
            ordinal,
            document_id = id,
            cost = resp.request_charge,
            "Original replaced"
        );
        Ok(Some(resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docvault_store::memory::{POINT_QUERY_CHARGE, REPLACE_CHARGE, UPSERT_CHARGE};
    use docvault_store::MemoryStore;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn strip_legacy(d: &Document) -> Document {
        let mut out = d.clone();
        out.remove("legacy");
        out
    }

    struct Fixture {
        store: MemoryStore,
        stats: Arc<StatsAccumulator>,
        source: ContainerName,
        destination: ContainerName,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let source = ContainerName::new("orders");
        let destination = ContainerName::new("orders-backup");
        store.create_container(&source, Some("tenant")).unwrap();
        store.create_container(&destination, Some("tenant")).unwrap();
        store
            .seed(
                &source,
                [doc(json!({"id": "d1", "tenant": "acme", "legacy": "x"}))],
            )
            .unwrap();
        Fixture {
            store,
            stats: Arc::new(StatsAccumulator::new()),
            source,
            destination,
        }
    }

    fn pipeline(f: &Fixture, dry_run: bool, workflow: Workflow) -> DocumentPipeline {
        DocumentPipeline::new(PipelineContext {
            store: Arc::new(f.store.clone()),
            source: f.source.clone(),
            destination: f.destination.clone(),
            job: JobName::new("job-1"),
            partition_key_field: "tenant".into(),
            dry_run,
            workflow,
            stats: f.stats.clone(),
        })
    }

    #[test]
    fn backup_document_is_tagged_copy_with_new_id() {
        let source = doc(json!({"id": "d1", "tenant": "acme", "n": 1}));
        let now = DateTime::parse_from_rfc3339("2026-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let backup = build_backup_document(&source, &JobName::new("nightly"), now);

        assert_ne!(backup["id"], json!("d1"));
        assert!(Uuid::parse_str(backup["id"].as_str().unwrap()).is_ok());
        assert_eq!(backup[ID_ORIGINAL_FIELD], json!("d1"));
        assert_eq!(backup[BACKUP_DATE_FIELD], json!("2026-01-15T10:00:00.000Z"));
        assert_eq!(backup[JOB_NAME_FIELD], json!("nightly"));
        assert_eq!(backup["n"], json!(1));
        assert_eq!(source["id"], json!("d1"), "source must be untouched");
    }

    #[test]
    fn cleaned_document_keeps_addressing_fields() {
        let source = doc(json!({"id": "d1", "tenant": "acme", "legacy": 1}));
        let wipe = |_: &Document| doc(json!({"id": "other", "fresh": true}));
        let cleaned = build_cleaned_document(&source, &wipe, &JobName::new("j"), "tenant");
        assert_eq!(
            cleaned,
            doc(json!({"id": "d1", "tenant": "acme", "fresh": true, "jobName": "j"}))
        );
    }

    #[test]
    fn existence_query_binds_all_three_predicates() {
        let q = backup_existence_query("d1", "tenant", &json!("acme"), &JobName::new("j"));
        assert!(q.text.contains("COUNT(1)"));
        assert_eq!(q.parameter("@idOriginal"), Some(&json!("d1")));
        assert_eq!(q.parameter("@tenant"), Some(&json!("acme")));
        assert_eq!(q.parameter("@jobName"), Some(&json!("j")));
    }

    #[test]
    fn scalar_positive_accepts_counts_and_bools() {
        assert!(scalar_is_positive(Some(&json!(2))));
        assert!(scalar_is_positive(Some(&json!(true))));
        assert!(!scalar_is_positive(Some(&json!(0))));
        assert!(!scalar_is_positive(Some(&json!("1"))));
        assert!(!scalar_is_positive(None));
    }

    #[tokio::test]
    async fn backup_workflow_writes_one_backup() {
        let f = fixture();
        let p = pipeline(&f, false, Workflow::Backup);
        let src = f.store.documents(&f.source).unwrap().remove(0);

        let outcome = p.process(src, 1).await.unwrap();
        assert!(outcome.backed_up);
        assert_eq!(outcome.verified, None);

        let backups = f.store.documents(&f.destination).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0][ID_ORIGINAL_FIELD], json!("d1"));
        let s = f.stats.snapshot();
        assert_eq!((s.examined, s.backups, s.updates), (1, 1, 0));
        assert!((s.total_cost - UPSERT_CHARGE).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn clean_workflow_verifies_then_replaces() {
        let f = fixture();
        let p = pipeline(&f, false, Workflow::Clean(Arc::new(strip_legacy)));
        let src = f.store.documents(&f.source).unwrap().remove(0);

        let outcome = p.process(src, 1).await.unwrap();
        assert_eq!(
            outcome,
            DocumentOutcome {
                backed_up: true,
                verified: Some(true),
                updated: true,
                skipped: false,
            }
        );

        let originals = f.store.documents(&f.source).unwrap();
        assert!(originals[0].get("legacy").is_none());
        assert_eq!(originals[0][JOB_NAME_FIELD], json!("job-1"));
        let backups = f.store.documents(&f.destination).unwrap();
        assert_eq!(backups[0]["legacy"], json!("x"), "backup keeps pre-clean content");

        let s = f.stats.snapshot();
        assert_eq!((s.backups, s.updates, s.verified_ok), (1, 1, 1));
        let expected = UPSERT_CHARGE + POINT_QUERY_CHARGE + REPLACE_CHARGE;
        assert!((s.total_cost - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn upsert_failure_aborts_document_without_further_io() {
        let f = fixture();
        f.store
            .fail_upserts_when(|c, _| c.as_str() == "orders-backup")
            .unwrap();
        let p = pipeline(&f, false, Workflow::Clean(Arc::new(strip_legacy)));
        let src = f.store.documents(&f.source).unwrap().remove(0);

        let err = p.process(src.clone(), 1).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Upstream {
                operation: StoreOperation::Upsert,
                ..
            }
        ));
        assert_eq!(f.store.documents(&f.source).unwrap()[0], src);
        let s = f.stats.snapshot();
        assert_eq!(s.examined, 1);
        assert_eq!((s.backups, s.updates), (0, 0));
        assert_eq!(s.verified_ok + s.verified_failed, 0);
    }

    #[tokio::test]
    async fn verification_failure_keeps_backup_counted() {
        let f = fixture();
        f.store.fail_point_queries_when(|_, _| true).unwrap();
        let p = pipeline(&f, false, Workflow::Clean(Arc::new(strip_legacy)));
        let src = f.store.documents(&f.source).unwrap().remove(0);

        let err = p.process(src.clone(), 1).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Upstream {
                operation: StoreOperation::PointQuery,
                ..
            }
        ));
        assert_eq!(f.store.documents(&f.destination).unwrap().len(), 1);
        assert_eq!(f.store.documents(&f.source).unwrap()[0], src);
        let s = f.stats.snapshot();
        assert_eq!((s.backups, s.updates), (1, 0));
        assert_eq!(s.verified_ok + s.verified_failed, 0);
    }

    #[tokio::test]
    async fn replace_failure_keeps_backup_and_verification_counted() {
        let f = fixture();
        f.store
            .fail_replaces_when(|c, _| c.as_str() == "orders")
            .unwrap();
        let p = pipeline(&f, false, Workflow::Clean(Arc::new(strip_legacy)));
        let src = f.store.documents(&f.source).unwrap().remove(0);

        let err = p.process(src.clone(), 1).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Upstream {
                operation: StoreOperation::Replace,
                ..
            }
        ));
        assert_eq!(f.store.documents(&f.source).unwrap()[0], src);
        let s = f.stats.snapshot();
        assert_eq!((s.backups, s.verified_ok, s.updates), (1, 1, 0));
        let expected = UPSERT_CHARGE + POINT_QUERY_CHARGE;
        assert!((s.total_cost - expected).abs() < 1e-9);
    }

    /// Delegates to a [`MemoryStore`] but never finds anything on point queries.
    struct BlindStore(MemoryStore);

    #[async_trait]
    impl DocumentStore for BlindStore {
        fn query_container(
            &self,
            container: &ContainerName,
            query: &QuerySpec,
            page_size: u32,
        ) -> docvault_store::error::Result<Box<dyn docvault_store::DocumentCursor>> {
            self.0.query_container(container, query, page_size)
        }

        async fn upsert(
            &self,
            container: &ContainerName,
            document: &Document,
        ) -> docvault_store::error::Result<WriteResponse> {
            self.0.upsert(container, document).await
        }

        async fn replace(
            &self,
            container: &ContainerName,
            id: &str,
            partition_key: &Value,
            document: &Document,
        ) -> docvault_store::error::Result<WriteResponse> {
            self.0.replace(container, id, partition_key, document).await
        }

        async fn point_query(
            &self,
            _container: &ContainerName,
            _query: &QuerySpec,
        ) -> docvault_store::error::Result<docvault_store::PointQueryResponse> {
            Ok(docvault_store::PointQueryResponse {
                value: Some(json!(0)),
                request_charge: POINT_QUERY_CHARGE,
            })
        }

        async fn container_exists(
            &self,
            container: &ContainerName,
        ) -> docvault_store::error::Result<bool> {
            self.0.container_exists(container).await
        }
    }

    #[tokio::test]
    async fn missing_backup_blocks_replace() {
        let f = fixture();
        let p = DocumentPipeline::new(PipelineContext {
            store: Arc::new(BlindStore(f.store.clone())),
            source: f.source.clone(),
            destination: f.destination.clone(),
            job: JobName::new("job-1"),
            partition_key_field: "tenant".into(),
            dry_run: false,
            workflow: Workflow::Clean(Arc::new(strip_legacy)),
            stats: f.stats.clone(),
        });
        let src = f.store.documents(&f.source).unwrap().remove(0);

        let outcome = p.process(src.clone(), 1).await.unwrap();
        assert_eq!(outcome.verified, Some(false));
        assert!(outcome.backed_up && !outcome.updated);
        assert_eq!(f.store.documents(&f.source).unwrap()[0], src);
        let s = f.stats.snapshot();
        assert_eq!((s.verified_ok, s.verified_failed, s.updates), (0, 1, 0));
    }

    #[tokio::test]
    async fn dry_run_skips_every_write() {
        let f = fixture();
        let p = pipeline(&f, true, Workflow::Clean(Arc::new(strip_legacy)));
        let src = f.store.documents(&f.source).unwrap().remove(0);
        let calls_before = f.store.call_count();

        let outcome = p.process(src.clone(), 1).await.unwrap();
        assert_eq!(outcome, DocumentOutcome::default());
        assert_eq!(f.store.call_count(), calls_before);
        assert!(f.store.documents(&f.destination).unwrap().is_empty());
        assert_eq!(f.store.documents(&f.source).unwrap()[0], src);

        let s = f.stats.snapshot();
        assert_eq!(s.examined, 1);
        assert_eq!((s.backups, s.updates, s.verified_ok, s.verified_failed), (0, 0, 0, 0));
    }

    #[tokio::test]
    async fn tester_rejection_skips_verify_and_replace() {
        struct Never;
        impl DocumentCleaner for Never {
            fn should_clean(&self, _doc: &Document) -> bool {
                false
            }
            fn clean(&self, doc: &Document) -> Document {
                doc.clone()
            }
        }
        let f = fixture();
        let p = pipeline(&f, false, Workflow::Clean(Arc::new(Never)));
        let src = f.store.documents(&f.source).unwrap().remove(0);

        let outcome = p.process(src, 1).await.unwrap();
        assert!(outcome.backed_up && outcome.skipped && !outcome.updated);
        let s = f.stats.snapshot();
        assert_eq!((s.backups, s.skipped, s.verified_ok), (1, 1, 0));
    }

    #[tokio::test]
    async fn document_without_partition_key_is_rejected_before_io() {
        let f = fixture();
        let p = pipeline(&f, false, Workflow::Backup);
        let calls_before = f.store.call_count();
        let err = p.process(doc(json!({"id": "x"})), 7).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidDocument { ordinal: 7, .. }));
        assert_eq!(f.store.call_count(), calls_before);
        assert_eq!(f.stats.snapshot().examined, 0);
    }
}
