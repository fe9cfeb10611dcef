//! Document store capability for docvault.
//!
//! Provides the [`DocumentStore`] / [`DocumentCursor`] traits the engine
//! consumes, and a [`MemoryStore`] implementation that can be loaded from and
//! saved to a JSON snapshot file.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod memory;

pub use backend::{DocumentCursor, DocumentStore, FetchedPage, PointQueryResponse, WriteResponse};
pub use error::StoreError;
pub use memory::MemoryStore;
