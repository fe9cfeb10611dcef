//! Job controller: resolves run options, runs the scheduler, reports a summary.

use std::sync::Arc;
use std::time::Instant;

use docvault_store::DocumentStore;
use docvault_types::{ContainerName, JobName, QuerySpec, RunMode};

use crate::cleaner::DocumentCleaner;
use crate::cursor::CursorSource;
use crate::errors::EngineError;
use crate::pipeline::{DocumentPipeline, PipelineContext};
use crate::result::{RunStatus, RunSummary};
use crate::scheduler::PageScheduler;
use crate::stats::StatsAccumulator;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_DRY_RUN: bool = true;

/// Which stages run for each document.
#[derive(Clone)]
pub enum Workflow {
    /// Copy documents to the destination only.
    Backup,
    /// Copy, verify the copy, then replace the original with the cleaned document.
    Clean(Arc<dyn DocumentCleaner>),
}

impl Workflow {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Clean(_) => "clean",
        }
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a job reads from and writes to. Fixed for the controller's lifetime.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job: JobName,
    pub source: ContainerName,
    pub destination: ContainerName,
    pub partition_key_field: String,
}

/// Caller-supplied run options. Unset fields take the defaults
/// (`page_size = 100`, `dry_run = true`, `run_mode = "single"`).
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub query: QuerySpec,
    pub page_size: Option<u32>,
    pub dry_run: Option<bool>,
    pub run_mode: Option<String>,
}

/// Run options with defaults applied and values checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRun {
    pub query: QuerySpec,
    pub page_size: u32,
    pub dry_run: bool,
    pub run_mode: RunMode,
}

impl RunOptions {
    /// Apply defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRunMode` for an unrecognized mode string, or
    /// `InvalidPageSize` for a zero page size.
    pub fn resolve(&self) -> Result<ResolvedRun, EngineError> {
        let run_mode = match self.run_mode.as_deref() {
            None => RunMode::default(),
            Some(raw) => raw
                .parse()
                .map_err(|_| EngineError::InvalidRunMode(raw.to_string()))?,
        };
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(EngineError::InvalidPageSize);
        }
        Ok(ResolvedRun {
            query: self.query.clone(),
            page_size,
            dry_run: self.dry_run.unwrap_or(DEFAULT_DRY_RUN),
            run_mode,
        })
    }
}

/// Owns the run lifecycle for one job.
///
/// `run` takes `&mut self`, so a controller never has two active runs.
pub struct JobController {
    store: Arc<dyn DocumentStore>,
    spec: JobSpec,
    workflow: Workflow,
    stats: Arc<StatsAccumulator>,
    last_summary: Option<RunSummary>,
}

impl JobController {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, spec: JobSpec, workflow: Workflow) -> Self {
        Self {
            store,
            spec,
            workflow,
            stats: Arc::new(StatsAccumulator::new()),
            last_summary: None,
        }
    }

    /// Summary of the most recent run, including failed runs.
    #[must_use]
    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    /// Execute one run.
    ///
    /// Option errors are raised before any store call. Every other failure
    /// is logged with the partial summary, recorded in [`last_summary`],
    /// and returned.
    ///
    /// [`last_summary`]: Self::last_summary
    ///
    /// # Errors
    ///
    /// Returns the [`EngineError`] that ended the run.
    pub async fn run(&mut self, options: RunOptions) -> Result<RunSummary, EngineError> {
        let resolved = options.resolve().inspect_err(|e| {
            tracing::error!(job = %self.spec.job, error = %e, "Rejected run options");
        })?;

        self.stats.reset();
        let start = Instant::now();
        tracing::info!(
            job = %self.spec.job,
            workflow = self.workflow.name(),
            source = %self.spec.source,
            destination = %self.spec.destination,
            mode = %resolved.run_mode,
            page_size = resolved.page_size,
            dry_run = resolved.dry_run,
            "Starting run"
        );

        let pipeline = DocumentPipeline::new(PipelineContext {
            store: self.store.clone(),
            source: self.spec.source.clone(),
            destination: self.spec.destination.clone(),
            job: self.spec.job.clone(),
            partition_key_field: self.spec.partition_key_field.clone(),
            dry_run: resolved.dry_run,
            workflow: self.workflow.clone(),
            stats: self.stats.clone(),
        });
        let scheduler = PageScheduler::new(
            CursorSource::new(self.store.clone(), self.spec.source.clone()),
            pipeline,
            self.stats.clone(),
            resolved.query.clone(),
            resolved.page_size,
            resolved.run_mode,
            self.spec.job.clone(),
        );
        let outcome = scheduler.run().await;

        let summary = RunSummary {
            job: self.spec.job.to_string(),
            workflow: self.workflow.name(),
            mode: resolved.run_mode,
            dry_run: resolved.dry_run,
            status: if outcome.is_ok() {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            },
            duration_secs: start.elapsed().as_secs_f64(),
            stats: self.stats.snapshot(),
            error_message: outcome.as_ref().err().map(ToString::to_string),
        };
        log_summary(&summary);
        self.last_summary = Some(summary.clone());

        outcome.map(|_| summary)
    }
}

fn log_summary(summary: &RunSummary) {
    let s = &summary.stats;
    if summary.is_success() {
        tracing::info!(
            job = %summary.job,
            status = %summary.status,
            duration_secs = summary.duration_secs,
            total_cost = s.total_cost,
            cost_per_sec = summary.cost_per_second(),
            pages = s.pages,
            examined = s.examined,
            backups = s.backups,
            updates = s.updates,
            verified_ok = s.verified_ok,
            verified_failed = s.verified_failed,
            skipped = s.skipped,
            "Run finished"
        );
    } else {
        tracing::error!(
            job = %summary.job,
            status = %summary.status,
            duration_secs = summary.duration_secs,
            total_cost = s.total_cost,
            cost_per_sec = summary.cost_per_second(),
            pages = s.pages,
            examined = s.examined,
            backups = s.backups,
            updates = s.updates,
            verified_ok = s.verified_ok,
            verified_failed = s.verified_failed,
            skipped = s.skipped,
            error = summary.error_message.as_deref(),
            "Run failed with partial stats"
        );
    }
}
