//! In-memory job store used by tests and local runs

use async_trait::async_trait;
use chrono::Utc;
use roster_common::{EntityType, JobStatus};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{failure_error, JobFilter, JobStore, JobStoreError};
use crate::ingest::IngestionResult;
use crate::jobs::model::UploadJob;

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, UploadJob>>,
    unavailable: Mutex<Option<String>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, reason: Option<&str>) {
        *lock(&self.unavailable) = reason.map(str::to_string);
    }

    /// Insert a job as-is, e.g. to seed a state for tests
    pub fn insert(&self, job: UploadJob) {
        lock(&self.jobs).insert(job.id, job);
    }

    fn jobs(&self) -> Result<MutexGuard<'_, HashMap<Uuid, UploadJob>>, JobStoreError> {
        if let Some(reason) = lock(&self.unavailable).clone() {
            return Err(JobStoreError::Unavailable(reason));
        }
        Ok(lock(&self.jobs))
    }

    /// Apply `update` when the job exists and `guard` accepts its status
    fn transition(
        &self,
        id: Uuid,
        guard: impl Fn(JobStatus) -> bool,
        update: impl FnOnce(&mut UploadJob),
    ) -> Result<bool, JobStoreError> {
        let mut jobs = self.jobs()?;
        match jobs.get_mut(&id) {
            Some(job) if guard(job.status) => {
                update(job);
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(
        &self,
        entity_type: EntityType,
        total_rows: usize,
        created_by: &str,
    ) -> Result<UploadJob, JobStoreError> {
        let job = UploadJob::new(entity_type, total_rows, created_by);
        self.jobs()?.insert(job.id, job.clone());
        Ok(job)
    }

    async fn mark_running(&self, id: Uuid) -> Result<bool, JobStoreError> {
        self.transition(
            id,
            |status| status == JobStatus::Pending,
            |job| job.status = JobStatus::Running,
        )
    }

    async fn update_progress(&self, id: Uuid, processed_rows: usize) -> Result<(), JobStoreError> {
        self.transition(
            id,
            |status| status == JobStatus::Running,
            |job| job.processed_rows = processed_rows,
        )?;
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, result: &IngestionResult) -> Result<(), JobStoreError> {
        self.transition(
            id,
            |status| !status.is_terminal(),
            |job| {
                job.status = JobStatus::Completed;
                job.success_count = result.success_count;
                job.failure_count = result.failure_count;
                job.processed_rows = result.success_count + result.failure_count;
                job.row_errors = result.errors.clone();
                job.completed_at = Some(Utc::now());
            },
        )?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<(), JobStoreError> {
        self.transition(
            id,
            |status| !status.is_terminal(),
            |job| {
                job.status = JobStatus::Failed;
                job.row_errors = vec![failure_error(message)];
                job.completed_at = Some(Utc::now());
            },
        )?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<UploadJob>, JobStoreError> {
        Ok(self.jobs()?.get(&id).cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<UploadJob>, JobStoreError> {
        let mut jobs: Vec<UploadJob> = self
            .jobs()?
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(jobs
            .into_iter()
            .skip(filter.effective_offset())
            .take(filter.effective_limit())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ErrorCode;

    #[tokio::test]
    async fn test_running_transition_happens_once() {
        let store = MemoryJobStore::new();
        let job = store.create_job(EntityType::Class, 2, "admin").await.unwrap();

        assert!(store.mark_running(job.id).await.unwrap());
        assert!(!store.mark_running(job.id).await.unwrap());
        assert!(!store.mark_running(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_progress_only_applies_while_running() {
        let store = MemoryJobStore::new();
        let job = store.create_job(EntityType::Class, 10, "admin").await.unwrap();

        store.update_progress(job.id, 5).await.unwrap();
        assert_eq!(store.get_job(job.id).await.unwrap().unwrap().processed_rows, 0);

        store.mark_running(job.id).await.unwrap();
        store.update_progress(job.id, 5).await.unwrap();
        assert_eq!(store.get_job(job.id).await.unwrap().unwrap().processed_rows, 5);
    }

    #[tokio::test]
    async fn test_completion_records_counts() {
        let store = MemoryJobStore::new();
        let job = store.create_job(EntityType::Class, 3, "admin").await.unwrap();
        store.mark_running(job.id).await.unwrap();

        let result = IngestionResult {
            total_rows: 3,
            success_count: 2,
            failure_count: 1,
            errors: vec![crate::ingest::IngestionError::new(
                2,
                "batch",
                ErrorCode::RequiredField,
                "'batch' is required",
            )],
        };
        store.mark_completed(job.id, &result).await.unwrap();

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_rows, 3);
        assert_eq!(job.row_errors.len(), 1);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let store = MemoryJobStore::new();
        let job = store.create_job(EntityType::Room, 1, "admin").await.unwrap();

        store.mark_failed(job.id, "broker gone").await.unwrap();
        store.mark_completed(job.id, &IngestionResult::default()).await.unwrap();

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.row_errors[0].row, 0);
        assert_eq!(job.row_errors[0].message, "broker gone");
    }

    #[tokio::test]
    async fn test_listing_filters_and_pages() {
        let store = MemoryJobStore::new();
        for _ in 0..3 {
            store.create_job(EntityType::Class, 1, "admin").await.unwrap();
        }
        store.create_job(EntityType::Room, 1, "admin").await.unwrap();

        let filter = JobFilter {
            entity_type: Some(EntityType::Class),
            limit: Some(2),
            ..JobFilter::default()
        };
        let jobs = store.list_jobs(&filter).await.unwrap();

        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.entity_type == EntityType::Class));
        assert!(jobs[0].created_at >= jobs[1].created_at);
    }
}
