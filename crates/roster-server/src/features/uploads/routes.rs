//! Upload routes

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;

use super::commands::{submit::handle as handle_submit, SubmitUploadCommand};
use crate::error::AppError;
use crate::features::AppState;

/// Largest accepted CSV body
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const CREATED_BY_HEADER: &str = "x-user-id";

pub fn uploads_routes() -> Router<AppState> {
    Router::new()
        .route("/:entity_type", post(submit_upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Submit a CSV for import
///
/// POST /uploads/:entity_type with the raw CSV as body
async fn submit_upload(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let command = SubmitUploadCommand {
        entity_type,
        csv_text: body,
        created_by: headers
            .get(CREATED_BY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let response = handle_submit(&state, command).await?;
    Ok((StatusCode::ACCEPTED, Json(json!(response))).into_response())
}
