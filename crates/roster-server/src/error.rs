//! HTTP-facing error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::features::uploads::commands::SubmitUploadError;
use crate::ingest::IngestionError;
use crate::jobs::JobStoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The upload was understood but its content cannot be imported
    #[error("Unprocessable: {message}")]
    Unprocessable {
        message: String,
        errors: Vec<IngestionError>,
    },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, errors) = match self {
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            AppError::Unprocessable { message, errors } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message, Some(errors))
            },
            AppError::ServiceUnavailable(message) => {
                tracing::warn!("Service unavailable: {}", message);
                (StatusCode::SERVICE_UNAVAILABLE, message, None)
            },
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message, None)
            },
        };

        let mut error = json!({
            "message": error_message,
            "status": status.as_u16(),
        });
        if let Some(errors) = errors {
            error["errors"] = json!(errors);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<SubmitUploadError> for AppError {
    fn from(err: SubmitUploadError) -> Self {
        match err {
            SubmitUploadError::UnknownEntityType(_)
            | SubmitUploadError::EmptyBody
            | SubmitUploadError::NoDataRows => AppError::BadRequest(err.to_string()),
            SubmitUploadError::InvalidCsv(errors) => AppError::Unprocessable {
                message: "CSV validation failed, job not created".to_string(),
                errors,
            },
            SubmitUploadError::PreconditionFailed(errors) => AppError::Unprocessable {
                message: "Import preconditions are not met".to_string(),
                errors,
            },
            SubmitUploadError::Enqueue(_) => AppError::ServiceUnavailable(err.to_string()),
            SubmitUploadError::Store(_) | SubmitUploadError::JobStore(_) => {
                AppError::Internal(err.to_string())
            },
        }
    }
}

impl From<JobStoreError> for AppError {
    fn from(err: JobStoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}
