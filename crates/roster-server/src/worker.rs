//! Import job worker
//!
//! Consumes every entity type's work queue, runs the ingestion pipeline for
//! each job and settles the delivery. Every nack is sent with
//! `requeue = false`: rejected messages go to the dead-letter queue and
//! retries travel as fresh copies with an incremented `x-retry-count`.

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use lapin::options::BasicConsumeOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Consumer};
use roster_common::{EntityType, JobMessage};
use serde::Deserialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ingest::{ImporterRegistry, IngestionPipeline, ProgressReporter};
use crate::jobs::{JobStore, JobStoreError};
use crate::queue::amqp::{retry_count_from_headers, AmqpChannel};
use crate::queue::{ConnectionManager, IncomingMessage, MessageChannel, QueueError};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The parts of a job message needed to fail its job
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobEnvelope {
    job_id: Uuid,
    entity_type: Option<String>,
}

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Pipeline ran, job COMPLETED, message acked
    Completed,
    /// Pipeline failed, a copy was republished with this retry count
    Retried { retry_count: u32 },
    /// Job marked FAILED, message dead-lettered
    Failed,
    /// Message could not be tied to a job and was dead-lettered
    DeadLettered,
    /// Job already terminal, message acked without work
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Job store error: {0}")]
    JobStore(#[from] JobStoreError),
}

/// Forwards pipeline progress to the job record
struct JobProgressReporter {
    jobs: Arc<dyn JobStore>,
    job_id: Uuid,
}

#[async_trait]
impl ProgressReporter for JobProgressReporter {
    async fn report(&self, processed_rows: usize) {
        if let Err(e) = self.jobs.update_progress(self.job_id, processed_rows).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to record job progress");
        }
    }
}

pub struct Worker {
    pipeline: IngestionPipeline,
    registry: Arc<ImporterRegistry>,
    jobs: Arc<dyn JobStore>,
    max_retries: u32,
}

impl Worker {
    pub fn new(
        pipeline: IngestionPipeline,
        registry: Arc<ImporterRegistry>,
        jobs: Arc<dyn JobStore>,
        max_retries: u32,
    ) -> Self {
        Self {
            pipeline,
            registry,
            jobs,
            max_retries,
        }
    }

    /// Handle one delivery and settle it on `channel`
    pub async fn handle_delivery(
        &self,
        channel: &dyn MessageChannel,
        message: &IncomingMessage,
    ) -> Result<DeliveryOutcome, WorkerError> {
        let job = match JobMessage::from_slice(&message.body) {
            Ok(job) => job,
            Err(e) => return self.reject_undecodable(channel, message, &e.to_string()).await,
        };
        let job_id = job.job_id;
        let entity_type = job.entity_type;
        let retry_count = message.retry_count;

        let Some(importer) = self.registry.get(entity_type) else {
            let reason = format!("No importer registered for {}", entity_type);
            error!(%job_id, %entity_type, "{}", reason);
            self.jobs.mark_failed(job_id, &reason).await?;
            channel.nack(message.delivery_tag, false).await?;
            return Ok(DeliveryOutcome::Failed);
        };

        if !self.jobs.mark_running(job_id).await? {
            match self.jobs.get_job(job_id).await? {
                None => {
                    warn!(%job_id, %entity_type, "Dead-lettering message for unknown job");
                    channel.nack(message.delivery_tag, false).await?;
                    return Ok(DeliveryOutcome::DeadLettered);
                }
                Some(existing) if existing.status.is_terminal() => {
                    info!(%job_id, status = %existing.status, "Job already finished, skipping delivery");
                    channel.ack(message.delivery_tag).await?;
                    return Ok(DeliveryOutcome::Skipped);
                }
                // RUNNING: a retry or a redelivery of an interrupted attempt
                Some(_) => {}
            }
        }

        let csv_text = match job.csv_text() {
            Ok(text) => text,
            Err(e) => {
                error!(%job_id, %entity_type, error = %e, "Undecodable CSV payload");
                self.jobs.mark_failed(job_id, &e.to_string()).await?;
                channel.nack(message.delivery_tag, false).await?;
                return Ok(DeliveryOutcome::Failed);
            }
        };

        info!(%job_id, %entity_type, retry_count, total_rows = job.total_rows, "Starting import job");

        let progress = JobProgressReporter {
            jobs: Arc::clone(&self.jobs),
            job_id,
        };
        match self.pipeline.ingest(&csv_text, importer.as_ref(), &progress).await {
            Ok(result) => {
                self.jobs.mark_completed(job_id, &result).await?;
                channel.ack(message.delivery_tag).await?;
                info!(
                    %job_id,
                    %entity_type,
                    success_count = result.success_count,
                    failure_count = result.failure_count,
                    "Import job completed"
                );
                Ok(DeliveryOutcome::Completed)
            }
            Err(e) => {
                let next_retry = retry_count + 1;
                if next_retry < self.max_retries {
                    warn!(%job_id, %entity_type, retry_count, error = %e, "Import failed, scheduling retry");
                    if let Err(publish_error) = channel
                        .publish(entity_type.queue_name(), &message.body, next_retry)
                        .await
                    {
                        error!(%job_id, error = %publish_error, "Could not republish job for retry");
                        self.jobs
                            .mark_failed(job_id, &format!("Failed to schedule retry: {}", publish_error))
                            .await?;
                        channel.nack(message.delivery_tag, false).await?;
                        return Ok(DeliveryOutcome::Failed);
                    }
                    channel.nack(message.delivery_tag, false).await?;
                    Ok(DeliveryOutcome::Retried {
                        retry_count: next_retry,
                    })
                } else {
                    error!(%job_id, %entity_type, retry_count, error = %e, "Import failed permanently");
                    self.jobs
                        .mark_failed(
                            job_id,
                            &format!("Max retries ({}) exceeded: {}", self.max_retries, e),
                        )
                        .await?;
                    channel.nack(message.delivery_tag, false).await?;
                    Ok(DeliveryOutcome::Failed)
                }
            }
        }
    }

    /// A body that is not a `JobMessage` still fails its job when it names one
    async fn reject_undecodable(
        &self,
        channel: &dyn MessageChannel,
        message: &IncomingMessage,
        decode_error: &str,
    ) -> Result<DeliveryOutcome, WorkerError> {
        let Ok(envelope) = serde_json::from_slice::<JobEnvelope>(&message.body) else {
            warn!(queue = %message.queue, error = %decode_error, "Dead-lettering malformed message");
            channel.nack(message.delivery_tag, false).await?;
            return Ok(DeliveryOutcome::DeadLettered);
        };

        let reason = match envelope.entity_type.as_deref() {
            Some(name) if name.parse::<EntityType>().is_err() => {
                format!("No importer registered for {}", name)
            }
            None => "No importer registered for message without entityType".to_string(),
            Some(_) => format!("Invalid job message: {}", decode_error),
        };
        error!(job_id = %envelope.job_id, queue = %message.queue, "{}", reason);
        self.jobs.mark_failed(envelope.job_id, &reason).await?;
        channel.nack(message.delivery_tag, false).await?;
        Ok(DeliveryOutcome::Failed)
    }

    /// `handle_delivery` behind a safety net: a handler error or panic
    /// dead-letters the message instead of stalling the consumer
    pub async fn process(&self, channel: &dyn MessageChannel, message: IncomingMessage) -> DeliveryOutcome {
        let handled = AssertUnwindSafe(self.handle_delivery(channel, &message))
            .catch_unwind()
            .await;

        match handled {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(queue = %message.queue, delivery_tag = message.delivery_tag, error = %e, "Delivery handler failed");
                self.reject(channel, message.delivery_tag).await;
                DeliveryOutcome::DeadLettered
            }
            Err(_) => {
                error!(queue = %message.queue, delivery_tag = message.delivery_tag, "Delivery handler panicked");
                self.reject(channel, message.delivery_tag).await;
                DeliveryOutcome::DeadLettered
            }
        }
    }

    async fn reject(&self, channel: &dyn MessageChannel, delivery_tag: u64) {
        if let Err(e) = channel.nack(delivery_tag, false).await {
            error!(delivery_tag, error = %e, "Failed to reject delivery");
        }
    }

    /// Subscribe to every queue now and again after each reconnect
    ///
    /// When the first subscribe fails the supervisor takes over, so an
    /// `Err` here means consumers start later, not never.
    pub async fn start(self: Arc<Self>, manager: Arc<ConnectionManager>) -> Result<(), QueueError> {
        let worker = Arc::clone(&self);
        manager.on_reconnect(Arc::new(move |channel: Channel| {
            let worker = Arc::clone(&worker);
            async move { worker.subscribe_all(channel).await }.boxed()
        }));

        let subscribed = match manager.acquire_channel().await {
            Ok(channel) => self.subscribe_all(channel).await,
            Err(e) => Err(e),
        };
        if subscribed.is_err() {
            manager.request_resubscribe();
        }
        subscribed
    }

    async fn subscribe_all(self: &Arc<Self>, channel: Channel) -> Result<(), QueueError> {
        for entity_type in self.registry.entity_types() {
            let queue = entity_type.queue_name();
            let consumer = channel
                .basic_consume(
                    queue,
                    &format!("roster-worker-{}", queue),
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await?;

            let worker = Arc::clone(self);
            let amqp = AmqpChannel::new(channel.clone());
            tokio::spawn(async move { worker.consume(queue, amqp, consumer).await });
            info!(queue, "Consumer registered");
        }

        Ok(())
    }

    async fn consume(&self, queue: &'static str, channel: AmqpChannel, mut consumer: Consumer) {
        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => {
                    let retry_count = retry_count_from_headers(delivery.properties.headers().as_ref());
                    let message = IncomingMessage {
                        delivery_tag: delivery.delivery_tag,
                        queue: queue.to_string(),
                        body: delivery.data,
                        retry_count,
                    };
                    self.process(&channel, message).await;
                }
                Err(e) => {
                    warn!(queue, error = %e, "Consumer stream failed");
                    break;
                }
            }
        }

        info!(queue, "Consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{MemoryRecordStore, PasswordHasher};
    use crate::jobs::MemoryJobStore;
    use crate::queue::{MemoryChannel, Settlement};
    use crate::queue::ReconnectPolicy;
    use roster_common::JobStatus;
    use std::time::Duration;

    fn worker(jobs: Arc<MemoryJobStore>, registry: ImporterRegistry) -> Worker {
        let pipeline = IngestionPipeline::new(Arc::new(MemoryRecordStore::new()));
        Worker::new(pipeline, Arc::new(registry), jobs, DEFAULT_MAX_RETRIES)
    }

    fn delivery(body: Vec<u8>) -> IncomingMessage {
        IncomingMessage {
            delivery_tag: 1,
            queue: "class_import".to_string(),
            body,
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_dead_lettered() {
        let jobs = Arc::new(MemoryJobStore::new());
        let worker = worker(jobs, ImporterRegistry::standard(PasswordHasher::new(4)));
        let channel = MemoryChannel::new();

        let outcome = worker.process(&channel, delivery(b"not json".to_vec())).await;

        assert_eq!(outcome, DeliveryOutcome::DeadLettered);
        assert_eq!(channel.settlements(), vec![(1, Settlement::Nack { requeue: false })]);
        assert!(channel.published().is_empty());
    }

    #[tokio::test]
    async fn test_missing_importer_fails_job() {
        let jobs = Arc::new(MemoryJobStore::new());
        let job = jobs.create_job(EntityType::Class, 1, "admin").await.unwrap();
        let worker = worker(jobs.clone(), ImporterRegistry::new());
        let channel = MemoryChannel::new();
        let message = JobMessage::new(job.id, EntityType::Class, 1, "class_name,batch\nA,2024\n");

        let outcome = worker.process(&channel, delivery(message.to_vec().unwrap())).await;

        assert_eq!(outcome, DeliveryOutcome::Failed);
        let job = jobs.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.row_errors[0].message, "No importer registered for CLASS_IMPORT");
    }

    #[tokio::test]
    async fn test_unknown_entity_type_fails_named_job() {
        let jobs = Arc::new(MemoryJobStore::new());
        let job = jobs.create_job(EntityType::Class, 1, "admin").await.unwrap();
        let worker = worker(jobs.clone(), ImporterRegistry::standard(PasswordHasher::new(4)));
        let channel = MemoryChannel::new();
        let body = serde_json::json!({
            "jobId": job.id,
            "entityType": "ATTENDANCE_IMPORT",
            "totalRows": 1,
            "csvPayload": "",
        });

        let outcome = worker
            .process(&channel, delivery(serde_json::to_vec(&body).unwrap()))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Failed);
        assert_eq!(channel.settlements(), vec![(1, Settlement::Nack { requeue: false })]);
        let job = jobs.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.row_errors[0].message, "No importer registered for ATTENDANCE_IMPORT");
    }

    #[tokio::test]
    async fn test_incomplete_message_fails_named_job() {
        let jobs = Arc::new(MemoryJobStore::new());
        let job = jobs.create_job(EntityType::Room, 1, "admin").await.unwrap();
        let worker = worker(jobs.clone(), ImporterRegistry::standard(PasswordHasher::new(4)));
        let body = serde_json::json!({ "jobId": job.id, "entityType": "ROOM_IMPORT" });

        let outcome = worker
            .process(&MemoryChannel::new(), delivery(serde_json::to_vec(&body).unwrap()))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Failed);
        let job = jobs.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.row_errors[0].message.starts_with("Invalid job message:"));
    }

    #[tokio::test]
    async fn test_start_without_broker_leaves_consumers_to_supervisor() {
        let jobs = Arc::new(MemoryJobStore::new());
        let worker = Arc::new(worker(jobs, ImporterRegistry::standard(PasswordHasher::new(4))));
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            max_attempts: 1,
        };
        let manager = Arc::new(ConnectionManager::new("amqp://127.0.0.1:1", policy));

        let result = worker.start(manager.clone()).await;

        assert!(result.is_err());
        assert_eq!(manager.registration_count(), 1);
        assert!(manager.consumers_stopped());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_finished_job_is_skipped() {
        let jobs = Arc::new(MemoryJobStore::new());
        let job = jobs.create_job(EntityType::Class, 1, "admin").await.unwrap();
        jobs.mark_failed(job.id, "cancelled").await.unwrap();
        let worker = worker(jobs.clone(), ImporterRegistry::standard(PasswordHasher::new(4)));
        let channel = MemoryChannel::new();
        let message = JobMessage::new(job.id, EntityType::Class, 1, "class_name,batch\nA,2024\n");

        let outcome = worker.process(&channel, delivery(message.to_vec().unwrap())).await;

        assert_eq!(outcome, DeliveryOutcome::Skipped);
        assert_eq!(channel.settlements(), vec![(1, Settlement::Ack)]);
    }

    #[tokio::test]
    async fn test_bad_base64_fails_without_retry() {
        let jobs = Arc::new(MemoryJobStore::new());
        let job = jobs.create_job(EntityType::Class, 1, "admin").await.unwrap();
        let worker = worker(jobs.clone(), ImporterRegistry::standard(PasswordHasher::new(4)));
        let channel = MemoryChannel::new();
        let body = serde_json::json!({
            "jobId": job.id,
            "entityType": "CLASS_IMPORT",
            "totalRows": 1,
            "csvPayload": "%%% not base64 %%%",
        });

        let outcome = worker
            .process(&channel, delivery(serde_json::to_vec(&body).unwrap()))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Failed);
        assert!(channel.published().is_empty());
        assert_eq!(jobs.get_job(job.id).await.unwrap().unwrap().status, JobStatus::Failed);
    }
}
