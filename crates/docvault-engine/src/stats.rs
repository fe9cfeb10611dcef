//! Run-scoped statistics shared by every document task.

use std::sync::{Mutex, MutexGuard, PoisonError};

use docvault_types::StatsSnapshot;

/// Mutex-guarded run counters.
///
/// Every update takes the lock, mutates, and releases it before returning,
/// so no update spans an `.await`. A poisoned lock is recovered: the guarded
/// data is plain counters and stays consistent.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    inner: Mutex<StatsSnapshot>,
}

impl StatsAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StatsSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Zero every counter. Called at the start of each run.
    pub fn reset(&self) {
        *self.lock() = StatsSnapshot::default();
    }

    /// Add a request charge. Non-finite and negative charges are ignored.
    pub fn record_cost(&self, cost: f64) {
        if cost.is_finite() && cost > 0.0 {
            self.lock().total_cost += cost;
        }
    }

    /// Count a fetched page and return its 1-based number.
    pub fn begin_page(&self) -> u64 {
        let mut s = self.lock();
        s.pages += 1;
        s.pages
    }

    /// Allocate the next 1-based document ordinal.
    pub fn next_ordinal(&self) -> u64 {
        let mut s = self.lock();
        s.ordinal += 1;
        s.ordinal
    }

    pub fn record_examined(&self) {
        self.lock().examined += 1;
    }

    pub fn record_backup(&self) {
        self.lock().backups += 1;
    }

    pub fn record_update(&self) {
        self.lock().updates += 1;
    }

    pub fn record_verification(&self, ok: bool) {
        let mut s = self.lock();
        if ok {
            s.verified_ok += 1;
        } else {
            s.verified_failed += 1;
        }
    }

    pub fn record_skipped(&self) {
        self.lock().skipped += 1;
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        self.lock().clone()
    }
}
