//! Job state transitions
//!
//! Every method is one atomic update. `mark_running` is the only
//! conditional read-then-write and is what lets duplicate deliveries of the
//! same job converge.

mod memory;
mod postgres;

use async_trait::async_trait;
use roster_common::{EntityType, JobStatus, RosterError};
use uuid::Uuid;

use super::model::UploadJob;
use crate::ingest::{ErrorCode, IngestionError, IngestionResult};

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored job is invalid: {0}")]
    Corrupt(#[from] RosterError),

    #[error("Job store unavailable: {0}")]
    Unavailable(String),
}

/// Filter for job listings, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub entity_type: Option<EntityType>,
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl JobFilter {
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }

    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, job: &UploadJob) -> bool {
        self.entity_type.map_or(true, |t| t == job.entity_type)
            && self.status.map_or(true, |s| s == job.status)
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new PENDING job
    async fn create_job(
        &self,
        entity_type: EntityType,
        total_rows: usize,
        created_by: &str,
    ) -> Result<UploadJob, JobStoreError>;

    /// PENDING to RUNNING; false when the job is missing or already past PENDING
    async fn mark_running(&self, id: Uuid) -> Result<bool, JobStoreError>;

    /// Record progress of a RUNNING job
    async fn update_progress(&self, id: Uuid, processed_rows: usize) -> Result<(), JobStoreError>;

    /// Terminal COMPLETED with the import's counts and row errors
    async fn mark_completed(&self, id: Uuid, result: &IngestionResult) -> Result<(), JobStoreError>;

    /// Terminal FAILED with a single job-level error
    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<(), JobStoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<UploadJob>, JobStoreError>;

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<UploadJob>, JobStoreError>;
}

/// The single row-0 error stored on a failed job
pub(crate) fn failure_error(message: &str) -> IngestionError {
    IngestionError::new(0, "", ErrorCode::InsertFailed, message)
}
