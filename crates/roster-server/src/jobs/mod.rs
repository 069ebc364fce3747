//! Upload job records
//!
//! A job tracks one queued import from submission to its terminal state.
//! All transitions are single conditional updates, so two workers racing on
//! the same job converge on one outcome.

pub mod model;
pub mod store;

pub use model::UploadJob;
pub use store::{JobFilter, JobStore, JobStoreError, MemoryJobStore, PgJobStore};
