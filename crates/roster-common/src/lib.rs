//! Roster Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, error handling and logging setup for the roster workspace.
//!
//! - **Types**: entity types, job statuses and the queue message format
//! - **Logging**: one-call `tracing` subscriber setup driven by `LOG_*` variables

pub mod error;
pub mod logging;
pub mod types;

pub use error::{Result, RosterError};
pub use types::{EntityType, JobMessage, JobStatus};
