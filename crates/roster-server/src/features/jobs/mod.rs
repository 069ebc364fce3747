//! Jobs feature module
//!
//! Read-only access to upload job status.

pub mod queries;
pub mod routes;

pub use routes::jobs_routes;
