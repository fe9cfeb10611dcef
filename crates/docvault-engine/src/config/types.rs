//! Job configuration types deserialized from YAML.

use std::path::PathBuf;

use docvault_types::{ContainerName, Document, JobName, QuerySpec};
use serde::Deserialize;

use crate::controller::{JobSpec, RunOptions};

/// Default source query when a job file omits `query:`.
pub const DEFAULT_QUERY: &str = "SELECT * FROM c";

/// Top-level job file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub version: String,
    pub job: String,
    pub store: StoreConfig,
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    #[serde(default = "default_query")]
    pub query: QuerySpec,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub clean: Option<CleanConfig>,
}

fn default_query() -> QuerySpec {
    QuerySpec::new(DEFAULT_QUERY)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// JSON snapshot file backing the in-memory store.
    pub snapshot: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub container: String,
    pub partition_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    pub container: String,
}

/// Run options as written in the job file. Unset fields fall back to the
/// controller defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub dry_run: Option<bool>,
    /// Kept as a string so an unknown mode reaches the controller as
    /// `InvalidRunMode` rather than a YAML error.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Field-level cleaning rules for the clean workflow.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanConfig {
    #[serde(default)]
    pub remove_fields: Vec<String>,
    #[serde(default)]
    pub set_fields: Document,
    /// Tester: clean only documents carrying every one of these fields.
    #[serde(default)]
    pub only_if_present: Vec<String>,
}

impl JobConfig {
    #[must_use]
    pub fn job_spec(&self) -> JobSpec {
        JobSpec {
            job: JobName::new(self.job.clone()),
            source: ContainerName::new(self.source.container.clone()),
            destination: ContainerName::new(self.destination.container.clone()),
            partition_key_field: self.source.partition_key.clone(),
        }
    }

    /// Run options from the file, with CLI overrides layered on top.
    #[must_use]
    pub fn run_options(&self, overrides: &RunConfig) -> RunOptions {
        RunOptions {
            query: self.query.clone(),
            page_size: overrides.page_size.or(self.run.page_size),
            dry_run: overrides.dry_run.or(self.run.dry_run),
            run_mode: overrides.mode.clone().or_else(|| self.run.mode.clone()),
        }
    }
}
