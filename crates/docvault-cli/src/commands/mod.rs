pub mod check;
pub mod run;

use std::path::{Path, PathBuf};

/// Resolve the store snapshot path. Relative paths are taken from the job
/// file's directory so jobs can ship next to their data.
pub fn snapshot_path(job_path: &Path, snapshot: &Path) -> PathBuf {
    if snapshot.is_absolute() {
        return snapshot.to_path_buf();
    }
    job_path
        .parent()
        .map_or_else(|| snapshot.to_path_buf(), |dir| dir.join(snapshot))
}
