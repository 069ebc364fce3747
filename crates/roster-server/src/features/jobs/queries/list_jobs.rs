//! List jobs query
//!
//! Query to list upload jobs, newest first.

use mediator::Request;
use roster_common::{EntityType, JobStatus, RosterError};
use serde::{Deserialize, Serialize};

use crate::jobs::{JobFilter, JobStore, JobStoreError, UploadJob};

/// Query to list jobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListJobsQuery {
    /// Filter by entity type (e.g., "CLASS_IMPORT" or "classes")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Filter by status (e.g., "RUNNING")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Limit number of results (default 50, max 200)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Offset for pagination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

/// Response for list jobs query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<UploadJob>,
    pub limit: usize,
    pub offset: usize,
}

/// Error type for list jobs query
#[derive(Debug, thiserror::Error)]
pub enum ListJobsError {
    #[error("Invalid filter: {0}")]
    InvalidFilter(#[from] RosterError),
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

impl Request<Result<ListJobsResponse, ListJobsError>> for ListJobsQuery {}

impl ListJobsQuery {
    fn to_filter(&self) -> Result<JobFilter, RosterError> {
        Ok(JobFilter {
            entity_type: self
                .entity_type
                .as_deref()
                .map(str::parse::<EntityType>)
                .transpose()?,
            status: self.status.as_deref().map(str::parse::<JobStatus>).transpose()?,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

pub async fn handle(
    jobs: &dyn JobStore,
    query: ListJobsQuery,
) -> Result<ListJobsResponse, ListJobsError> {
    let filter = query.to_filter()?;
    let jobs = jobs.list_jobs(&filter).await?;

    Ok(ListJobsResponse {
        jobs,
        limit: filter.effective_limit(),
        offset: filter.effective_offset(),
    })
}
