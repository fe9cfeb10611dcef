//! Point-in-time run statistics.

use serde::{Deserialize, Serialize};

/// Counters and cost totals for one run.
///
/// Every counter is monotonically non-decreasing within a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Pages fetched so far (also the current page number, 1-based).
    pub pages: u64,
    /// Ordinal of the last document dispatched within the run (1-based).
    pub ordinal: u64,
    /// Sum of every request charge reported by the store.
    pub total_cost: f64,
    pub examined: u64,
    pub backups: u64,
    pub updates: u64,
    pub verified_ok: u64,
    pub verified_failed: u64,
    /// Documents the cleaner's tester declined.
    pub skipped: u64,
}

impl StatsSnapshot {
    /// Average request cost per second over `elapsed_secs`.
    ///
    /// Returns `0.0` for a zero-length interval.
    #[must_use]
    pub fn cost_per_second(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs > 0.0 {
            self.total_cost / elapsed_secs
        } else {
            0.0
        }
    }
}
