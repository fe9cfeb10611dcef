use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use docvault_engine::config::parser;
use docvault_engine::config::types::{JobConfig, RunConfig};
use docvault_engine::config::validator;
use docvault_engine::{FieldCleaner, JobController, RunSummary, Workflow};
use docvault_store::MemoryStore;

use super::snapshot_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    Backup,
    Clean,
}

/// Command-line overrides layered over the job file's `run:` block.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub execute: bool,
    pub mode: Option<String>,
    pub page_size: Option<u32>,
}

impl Overrides {
    fn to_run_config(&self) -> RunConfig {
        RunConfig {
            page_size: self.page_size,
            dry_run: self.execute.then_some(false),
            mode: self.mode.clone(),
        }
    }
}

fn workflow_for(kind: WorkflowKind, config: &JobConfig) -> Result<Workflow> {
    match kind {
        WorkflowKind::Backup => Ok(Workflow::Backup),
        WorkflowKind::Clean => {
            let clean = config.clean.as_ref().with_context(|| {
                format!("Job '{}' has no clean: block to run", config.job)
            })?;
            Ok(Workflow::Clean(Arc::new(FieldCleaner::from_config(clean))))
        }
    }
}

/// Execute the `backup` or `clean` command: parse, validate, run, persist.
pub async fn execute(job_path: &Path, kind: WorkflowKind, overrides: Overrides) -> Result<()> {
    // 1. Parse job YAML
    let config = parser::parse_job(job_path)
        .with_context(|| format!("Failed to parse job: {}", job_path.display()))?;

    // 2. Validate
    validator::validate_job(&config)?;
    let workflow = workflow_for(kind, &config)?;

    tracing::info!(
        job = config.job,
        source = config.source.container,
        destination = config.destination.container,
        workflow = workflow.name(),
        "Job validated"
    );

    // 3. Load store
    let snapshot = snapshot_path(job_path, &config.store.snapshot);
    let store = MemoryStore::load(&snapshot)
        .with_context(|| format!("Failed to load store snapshot: {}", snapshot.display()))?;

    // 4. Run
    let mut controller = JobController::new(Arc::new(store.clone()), config.job_spec(), workflow);
    let options = config.run_options(&overrides.to_run_config());
    let summary = match controller.run(options).await {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(partial) = controller.last_summary() {
                print_summary(partial);
            }
            return Err(e).with_context(|| format!("Job '{}' failed", config.job));
        }
    };

    // 5. Persist writes
    if !summary.dry_run {
        store
            .save(&snapshot)
            .with_context(|| format!("Failed to save store snapshot: {}", snapshot.display()))?;
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let s = &summary.stats;
    let outcome = if summary.is_success() {
        "completed successfully"
    } else {
        "FAILED"
    };
    let dry = if summary.dry_run { " (dry run)" } else { "" };
    println!(
        "Job '{}' {} {outcome}{dry}.",
        summary.job, summary.workflow
    );
    println!("  Mode:            {}", summary.mode);
    println!("  Elapsed:         {:.2}s", summary.duration_secs);
    println!("  Total cost:      {:.2}", s.total_cost);
    println!("  Cost/sec:        {:.2}", summary.cost_per_second());
    println!("  Pages:           {}", s.pages);
    println!("  Examined:        {}", s.examined);
    println!("  Backups:         {}", s.backups);
    if summary.workflow == "clean" {
        println!("  Updates:         {}", s.updates);
        println!("  Verified OK:     {}", s.verified_ok);
        println!("  Verify failed:   {}", s.verified_failed);
        println!("  Skipped:         {}", s.skipped);
    }
    if let Some(error) = &summary.error_message {
        println!("  Error:           {error}");
    }

    // Machine-readable JSON for scripting
    match serde_json::to_string(summary) {
        Ok(json) => println!("@@RUN_JSON@@{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize run summary"),
    }
}
