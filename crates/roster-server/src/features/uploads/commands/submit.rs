//! Submit upload command
//!
//! Gates an uploaded CSV and creates a PENDING job for it. Header and
//! precondition problems are reported before any job exists; a failed
//! publish leaves the job FAILED.

use mediator::Request;
use roster_common::{EntityType, JobMessage, JobStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::AppState;
use crate::ingest::parser::parse_csv;
use crate::ingest::{IngestionError, StoreError};
use crate::jobs::JobStoreError;
use crate::queue::QueueError;

pub const DEFAULT_CREATED_BY: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitUploadCommand {
    /// Wire name, queue name or plural slug
    pub entity_type: String,
    pub csv_text: String,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitUploadResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total_rows: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitUploadError {
    #[error("Invalid entity type: {0}")]
    UnknownEntityType(String),

    #[error("CSV content is empty")]
    EmptyBody,

    #[error("CSV validation failed, job not created")]
    InvalidCsv(Vec<IngestionError>),

    #[error("CSV contains no data rows")]
    NoDataRows,

    #[error("Import preconditions are not met")]
    PreconditionFailed(Vec<IngestionError>),

    #[error("Failed to enqueue job: {0}")]
    Enqueue(#[from] QueueError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job store error: {0}")]
    JobStore(#[from] JobStoreError),
}

impl Request<Result<SubmitUploadResponse, SubmitUploadError>> for SubmitUploadCommand {}

pub async fn handle(
    state: &AppState,
    command: SubmitUploadCommand,
) -> Result<SubmitUploadResponse, SubmitUploadError> {
    let entity_type: EntityType = command
        .entity_type
        .parse()
        .map_err(|_| SubmitUploadError::UnknownEntityType(command.entity_type.clone()))?;
    let importer = state
        .registry
        .get(entity_type)
        .ok_or_else(|| SubmitUploadError::UnknownEntityType(command.entity_type.clone()))?;

    if command.csv_text.trim().is_empty() {
        return Err(SubmitUploadError::EmptyBody);
    }

    let parsed = parse_csv(&command.csv_text, importer.expected_headers());
    if !parsed.is_ok() {
        return Err(SubmitUploadError::InvalidCsv(parsed.errors));
    }
    if parsed.rows.is_empty() {
        return Err(SubmitUploadError::NoDataRows);
    }

    let precondition_errors = state.pipeline.check_preconditions(importer.as_ref()).await?;
    if !precondition_errors.is_empty() {
        return Err(SubmitUploadError::PreconditionFailed(precondition_errors));
    }

    let total_rows = parsed.rows.len();
    let created_by = command.created_by.as_deref().unwrap_or(DEFAULT_CREATED_BY);
    let job = state.jobs.create_job(entity_type, total_rows, created_by).await?;

    let message = JobMessage::new(job.id, entity_type, total_rows, &command.csv_text);
    if let Err(e) = state.publisher.publish(&message).await {
        tracing::error!(job_id = %job.id, error = %e, "Failed to enqueue import job");
        if let Err(store_error) = state
            .jobs
            .mark_failed(job.id, &format!("Failed to enqueue: {}", e))
            .await
        {
            tracing::error!(job_id = %job.id, error = %store_error, "Failed to mark job as failed");
        }
        return Err(SubmitUploadError::Enqueue(e));
    }

    Ok(SubmitUploadResponse {
        job_id: job.id,
        status: job.status,
        total_rows,
    })
}
