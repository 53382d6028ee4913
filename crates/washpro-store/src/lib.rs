//! # washpro Store
//!
//! Durable storage for task metadata records and script blobs.
//!
//! ## Features
//!
//! - One JSON record per task, one optional script blob per task
//! - Atomic replace (write temporary, then rename) for every write
//! - Per-id mutual exclusion, parallel access across ids
//! - Typed decode that reports corruption instead of guessing

pub mod error;
pub mod file;
pub mod store;

pub use error::StoreError;
pub use file::FileTaskStore;
pub use store::{MemoryTaskStore, RecordMutator, TaskStore};
