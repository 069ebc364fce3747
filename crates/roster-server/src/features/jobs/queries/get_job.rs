//! Get job query
//!
//! Query to get a single upload job by ID.

use mediator::Request;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::{JobStore, JobStoreError, UploadJob};

/// Query to get a job by ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobQuery {
    pub job_id: Uuid,
}

/// Error type for get job query
#[derive(Debug, thiserror::Error)]
pub enum GetJobError {
    #[error("Job not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

impl Request<Result<UploadJob, GetJobError>> for GetJobQuery {}

pub async fn handle(jobs: &dyn JobStore, query: GetJobQuery) -> Result<UploadJob, GetJobError> {
    jobs.get_job(query.job_id).await?.ok_or(GetJobError::NotFound)
}
