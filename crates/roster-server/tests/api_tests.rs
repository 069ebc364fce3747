//! API integration tests
//!
//! Requests go through the full router (`/api/v1`, tracing and CORS
//! layers) with in-memory stores and a recording channel behind it.
//!
//! Coverage includes:
//! - Upload gating (entity type, empty body, headers, preconditions)
//! - Job creation and enqueueing
//! - Job status and listing, including filters
//! - Upload to completed job through the worker

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use roster_server::ingest::types::Scope;
use serde_json::Value;

mod common;

use common::{deliver, TestApp, CLASSES_CSV, ROOMS_CSV, SUBJECTS_CSV};

fn error_codes(body: &Value) -> Vec<String> {
    body["error"]["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .map(|e| e["code"].as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// Uploads
// ============================================================================

#[tokio::test]
async fn test_upload_creates_pending_job_and_enqueues_it() {
    let app = TestApp::new();

    let (status, body) = app.upload("classes", CLASSES_CSV).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["totalRows"], 2);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let published = app.channel.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].queue, "class_import");
    assert_eq!(published[0].retry_count, 0);

    let (status, job) = app.get(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "PENDING");
    assert_eq!(job["entityType"], "CLASS_IMPORT");
    assert_eq!(job["createdBy"], "admin");
    assert_eq!(job["totalRows"], 2);
}

#[tokio::test]
async fn test_upload_accepts_wire_name_and_user_header() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/uploads/SUBJECT_IMPORT")
        .header("x-user-id", "registrar-7")
        .body(Body::from(SUBJECTS_CSV))
        .unwrap();

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, job) = app
        .get(&format!("/api/v1/jobs/{}", body["jobId"].as_str().unwrap()))
        .await;
    assert_eq!(job["entityType"], "SUBJECT_IMPORT");
    assert_eq!(job["createdBy"], "registrar-7");
}

#[tokio::test]
async fn test_unknown_entity_type_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app.upload("widgets", CLASSES_CSV).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);
    assert_eq!(body["error"]["message"], "Invalid entity type: widgets");
}

#[tokio::test]
async fn test_empty_body_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app.upload("classes", "  \n").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "CSV content is empty");
}

#[tokio::test]
async fn test_header_mismatch_returns_errors_without_job() {
    let app = TestApp::new();

    let (status, body) = app.upload("classes", "class_name,batch,region\nCSE-A,2024,North\n").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_codes(&body), vec!["EXTRA_HEADER"]);
    assert!(app.channel.published().is_empty());

    let (_, list) = app.get("/api/v1/jobs").await;
    assert_eq!(list["jobs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_header_only_file_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app.upload("classes", "class_name,batch\n").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "CSV contains no data rows");
}

#[tokio::test]
async fn test_timetable_needs_existing_records() {
    let app = TestApp::new();
    let csv = "class_name,teacher_id,subject_code,room_number,day_of_week,start_time,end_time\n\
        CSE-A,T001,CS101,R1,Monday,09:00,10:00\n";

    let (status, body) = app.upload("timetable", csv).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_codes(&body), vec!["PRECONDITION_FAILED"; 4]);
    assert!(app.channel.published().is_empty());
}

#[tokio::test]
async fn test_failed_enqueue_marks_job_failed() {
    let app = TestApp::new();
    app.channel.fail_publishes(Some("broker unreachable"));

    let (status, _) = app.upload("classes", CLASSES_CSV).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, list) = app.get("/api/v1/jobs").await;
    let jobs = list["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["status"], "FAILED");
    let message = jobs[0]["rowErrors"][0]["message"].as_str().unwrap();
    assert!(message.starts_with("Failed to enqueue:"), "message: {}", message);
}

// ============================================================================
// Jobs
// ============================================================================

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app.get(&format!("/api/v1/jobs/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["status"], 404);

    let (status, _) = app.get("/api/v1/jobs/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_jobs_filters_and_pages() {
    let app = TestApp::new();
    app.upload("classes", CLASSES_CSV).await;
    app.upload("rooms", ROOMS_CSV).await;
    app.upload("subjects", SUBJECTS_CSV).await;

    let (status, list) = app.get("/api/v1/jobs?entity_type=rooms").await;
    assert_eq!(status, StatusCode::OK);
    let jobs = list["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["entityType"], "ROOM_IMPORT");

    let (_, list) = app.get("/api/v1/jobs?status=pending&limit=2").await;
    assert_eq!(list["jobs"].as_array().unwrap().len(), 2);
    assert_eq!(list["limit"], 2);

    let (_, list) = app.get("/api/v1/jobs?status=COMPLETED").await;
    assert_eq!(list["jobs"].as_array().unwrap().len(), 0);

    let (status, _) = app.get("/api/v1/jobs?status=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_runs_to_completion_through_worker() {
    let app = TestApp::new();
    let csv = "class_name,batch\nCSE-A,2024\nCSE-A,2025\nCSE-B,2024\n";

    let (_, body) = app.upload("classes", csv).await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let published = app.channel.take_published();
    let worker = app.worker();
    worker.process(&app.channel, deliver(&published[0], 1)).await;

    let (status, job) = app.get(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "COMPLETED");
    assert_eq!(job["totalRows"], 3);
    assert_eq!(job["successCount"], 2);
    assert_eq!(job["failureCount"], 1);
    assert_eq!(job["rowErrors"][0]["code"], "DUPLICATE_IN_FILE");
    assert_eq!(job["rowErrors"][0]["row"], 2);
    assert!(job["completedAt"].is_string());
    assert_eq!(app.records.count(Scope::Classes), 2);
}
