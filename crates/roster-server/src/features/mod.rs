//! HTTP feature slices
//!
//! Each feature is a vertical slice with its own commands or queries and a
//! `routes.rs`. Commands and queries implement the mediator `Request` trait
//! and are executed by a plain `handle` function per slice.
//!
//! - **uploads**: accept a CSV, gate it, create the job and enqueue it
//! - **jobs**: read-only job status

pub mod jobs;
pub mod uploads;

use axum::Router;
use std::sync::Arc;

use crate::ingest::{ImporterRegistry, IngestionPipeline};
use crate::jobs::JobStore;
use crate::queue::JobPublisher;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ImporterRegistry>,
    /// Used for the synchronous precondition gate
    pub pipeline: IngestionPipeline,
    pub jobs: Arc<dyn JobStore>,
    pub publisher: JobPublisher,
}

/// API router with every feature mounted under its own prefix
///
/// - `/uploads` - CSV submission
/// - `/jobs` - job status
pub fn router(state: AppState) -> Router<()> {
    Router::new()
        .nest("/uploads", uploads::uploads_routes())
        .nest("/jobs", jobs::jobs_routes())
        .with_state(state)
}
