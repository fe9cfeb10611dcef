//! Run summary reported by the job controller.

use docvault_types::{RunMode, StatsSnapshot};
use serde::Serialize;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one run. On failure `stats` holds whatever had accumulated
/// up to the failure.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub job: String,
    pub workflow: &'static str,
    pub mode: RunMode,
    pub dry_run: bool,
    pub status: RunStatus,
    pub duration_secs: f64,
    pub stats: StatsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RunSummary {
    /// Average request cost per second of wall-clock time.
    #[must_use]
    pub fn cost_per_second(&self) -> f64 {
        self.stats.cost_per_second(self.duration_secs)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
