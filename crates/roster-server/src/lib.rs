//! Roster Server Library
//!
//! Bulk CSV import service for school records: classes, subjects, rooms,
//! students, teachers and timetables.
//!
//! # Overview
//!
//! - **Uploads**: `POST /api/v1/uploads/:entity_type` gates the CSV
//!   (headers, preconditions), creates a PENDING job and publishes it to
//!   RabbitMQ.
//! - **Worker**: consumes the per-entity queues, runs the ingestion
//!   pipeline and records the outcome on the job. Failures are retried by
//!   republishing, up to a fixed ceiling, then dead-lettered.
//! - **Jobs**: `GET /api/v1/jobs` and `GET /api/v1/jobs/:id` expose status,
//!   counts and per-row errors.
//!
//! # Pipeline
//!
//! parse -> validate -> in-file duplicates -> resolve relations ->
//! stored duplicates -> schedule overlaps -> batched persist. Rows failing
//! any stage are reported and dropped; the rest continue.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use roster_server::ingest::{ImporterRegistry, IngestionPipeline, MemoryRecordStore, NoProgress, PasswordHasher};
//! use roster_common::EntityType;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let pipeline = IngestionPipeline::new(Arc::new(MemoryRecordStore::new()));
//! let registry = ImporterRegistry::standard(PasswordHasher::default());
//! let importer = registry.get(EntityType::Class).ok_or_else(|| anyhow::anyhow!("no importer"))?;
//!
//! let result = pipeline
//!     .ingest("class_name,batch\nCSE-A,2024\n", importer.as_ref(), &NoProgress)
//!     .await?;
//! assert_eq!(result.success_count, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod jobs;
pub mod middleware;
pub mod queue;
pub mod shutdown;
pub mod worker;

use axum::Router;

pub use error::AppError;
pub use features::AppState;

/// API routes under `/api/v1` with the tracing and CORS layers applied
pub fn create_router(state: AppState, cors: &config::CorsConfig) -> Router {
    Router::new()
        .nest("/api/v1", features::router(state))
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}
