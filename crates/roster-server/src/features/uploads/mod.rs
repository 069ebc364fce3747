//! Upload feature module
//!
//! Accepts a raw CSV body for one entity type, runs the header and
//! precondition gates synchronously and hands the import to the queue.

pub mod commands;
pub mod routes;

pub use routes::uploads_routes;
