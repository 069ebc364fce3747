//! Job routes
//!
//! Read-only routes for querying upload job status.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use super::queries::{
    get_job::handle as handle_get_job, list_jobs::handle as handle_list_jobs, GetJobError,
    GetJobQuery, ListJobsError, ListJobsQuery,
};
use crate::error::AppError;
use crate::features::AppState;

pub fn jobs_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/:job_id", get(get_job))
}

/// List jobs
///
/// GET /jobs?entity_type=CLASS_IMPORT&status=RUNNING&limit=50&offset=0
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Response, AppError> {
    match handle_list_jobs(state.jobs.as_ref(), query).await {
        Ok(response) => Ok((StatusCode::OK, Json(json!(response))).into_response()),
        Err(ListJobsError::InvalidFilter(e)) => Err(AppError::BadRequest(e.to_string())),
        Err(ListJobsError::Store(e)) => Err(e.into()),
    }
}

/// Get a specific job by ID
///
/// GET /jobs/:job_id
async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, AppError> {
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|_| AppError::NotFound(format!("Job {} not found", job_id)))?;

    match handle_get_job(state.jobs.as_ref(), GetJobQuery { job_id }).await {
        Ok(job) => Ok((StatusCode::OK, Json(json!(job))).into_response()),
        Err(GetJobError::NotFound) => Err(AppError::NotFound(format!("Job {} not found", job_id))),
        Err(GetJobError::Store(e)) => Err(e.into()),
    }
}
