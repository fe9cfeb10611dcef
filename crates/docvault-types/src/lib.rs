//! Shared data types for docvault copy jobs.
//!
//! Pure data only: no I/O, no async. Both the store and engine crates depend
//! on these so document shapes and run statistics have a single definition.

pub mod document;
pub mod job;
pub mod query;
pub mod stats;

pub use document::Document;
pub use job::{ContainerName, JobName, RunMode};
pub use query::{QueryParameter, QuerySpec};
pub use stats::StatsSnapshot;
