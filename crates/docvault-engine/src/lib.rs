//! Paginated, concurrency-controlled backup and clean engine.
//!
//! A run opens a cursor over the source container, fetches pages, and pushes
//! every document through the [`pipeline`] either one at a time or as a
//! joined fan-out per page. The [`controller`] owns the run lifecycle and
//! reports a [`result::RunSummary`].

pub mod cleaner;
pub mod config;
pub mod controller;
pub mod cursor;
pub mod errors;
pub mod pipeline;
pub mod result;
pub mod scheduler;
pub mod stats;

// Re-export public API for convenience
pub use cleaner::{DocumentCleaner, FieldCleaner};
pub use controller::{JobController, JobSpec, RunOptions, Workflow};
pub use errors::EngineError;
pub use result::{RunStatus, RunSummary};
