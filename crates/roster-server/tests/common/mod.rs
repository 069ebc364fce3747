//! Shared fixtures for roster-server integration tests
//!
//! Everything runs in memory: [`MemoryRecordStore`] for the school records,
//! [`MemoryJobStore`] for jobs and a recording [`MemoryChannel`] in place of
//! the broker.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use roster_common::EntityType;
use roster_server::{
    config::CorsConfig,
    create_router,
    ingest::{ImporterRegistry, IngestionPipeline, MemoryRecordStore, NoProgress, PasswordHasher},
    jobs::MemoryJobStore,
    queue::{IncomingMessage, JobPublisher, MemoryChannel, PublishedMessage},
    worker::{Worker, DEFAULT_MAX_RETRIES},
    AppState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// Lowest cost bcrypt accepts; keeps person imports fast
pub const TEST_HASH_COST: u32 = 4;

pub const CLASSES_CSV: &str = "class_name,batch\nCSE-A,2024\nCSE-B,2024\n";
pub const SUBJECTS_CSV: &str = "subject_code,subject_name\nCS101,Programming\nMA201,Calculus\n";
pub const ROOMS_CSV: &str = "room_number,building_name,floor_number\nR1,Main,1\nR2,Main,2\n";
pub const TEACHERS_CSV: &str = "teacher_id,name,email,password\n\
    T001,Ada Lovelace,ada@school.edu,secret1\n\
    T002,Alan Turing,alan@school.edu,secret2\n";

pub struct TestApp {
    pub router: Router,
    pub records: Arc<MemoryRecordStore>,
    pub jobs: Arc<MemoryJobStore>,
    pub channel: MemoryChannel,
    pub pipeline: IngestionPipeline,
    pub registry: Arc<ImporterRegistry>,
}

impl TestApp {
    pub fn new() -> Self {
        let records = Arc::new(MemoryRecordStore::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let channel = MemoryChannel::new();
        let pipeline = IngestionPipeline::new(records.clone());
        let registry = Arc::new(ImporterRegistry::standard(PasswordHasher::new(TEST_HASH_COST)));

        let state = AppState {
            registry: registry.clone(),
            pipeline: pipeline.clone(),
            jobs: jobs.clone(),
            publisher: JobPublisher::new(Arc::new(channel.clone())),
        };
        let cors = CorsConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        };

        Self {
            router: create_router(state, &cors),
            records,
            jobs,
            channel,
            pipeline,
            registry,
        }
    }

    pub fn worker(&self) -> Worker {
        Worker::new(
            self.pipeline.clone(),
            self.registry.clone(),
            self.jobs.clone(),
            DEFAULT_MAX_RETRIES,
        )
    }

    /// Import `csv` directly through the pipeline, bypassing jobs and queue
    pub async fn seed(&self, entity_type: EntityType, csv: &str) {
        let importer = self.registry.get(entity_type).unwrap();
        let result = self
            .pipeline
            .ingest(csv, importer.as_ref(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(result.failure_count, 0, "seed rejected rows: {:?}", result.errors);
    }

    /// Seed every scope a timetable import depends on
    pub async fn seed_timetable_dependencies(&self) {
        self.seed(EntityType::Class, CLASSES_CSV).await;
        self.seed(EntityType::Subject, SUBJECTS_CSV).await;
        self.seed(EntityType::Room, ROOMS_CSV).await;
        self.seed(EntityType::Teacher, TEACHERS_CSV).await;
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn upload(&self, entity: &str, csv: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/uploads/{}", entity))
            .header("content-type", "text/csv")
            .body(Body::from(csv.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,roster_server=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Turn a recorded publish into the delivery a consumer would receive
pub fn deliver(message: &PublishedMessage, delivery_tag: u64) -> IncomingMessage {
    IncomingMessage {
        delivery_tag,
        queue: message.queue.clone(),
        body: message.payload.clone(),
        retry_count: message.retry_count,
    }
}
