//! Postgres-backed job store over the `upload_jobs` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roster_common::{EntityType, JobStatus};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{failure_error, JobFilter, JobStore, JobStoreError};
use crate::ingest::{IngestionError, IngestionResult};
use crate::jobs::model::UploadJob;

const JOB_COLUMNS: &str = r#"
    id, entity_type, status, total_rows, processed_rows, success_count,
    failure_count, row_errors, created_by, completed_at, created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct UploadJobRow {
    id: Uuid,
    entity_type: String,
    status: String,
    total_rows: i64,
    processed_rows: i64,
    success_count: i64,
    failure_count: i64,
    row_errors: Json<Vec<IngestionError>>,
    created_by: String,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UploadJobRow> for UploadJob {
    type Error = JobStoreError;

    fn try_from(row: UploadJobRow) -> Result<Self, Self::Error> {
        Ok(UploadJob {
            id: row.id,
            entity_type: row.entity_type.parse::<EntityType>()?,
            status: row.status.parse::<JobStatus>()?,
            total_rows: from_db(row.total_rows),
            processed_rows: from_db(row.processed_rows),
            success_count: from_db(row.success_count),
            failure_count: from_db(row.failure_count),
            row_errors: row.row_errors.0,
            created_by: row.created_by,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn to_db(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn from_db(count: i64) -> usize {
    usize::try_from(count).unwrap_or(0)
}

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(
        &self,
        entity_type: EntityType,
        total_rows: usize,
        created_by: &str,
    ) -> Result<UploadJob, JobStoreError> {
        let sql = format!(
            r#"
            INSERT INTO upload_jobs (id, entity_type, status, total_rows, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UploadJobRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(entity_type.as_str())
            .bind(JobStatus::Pending.as_str())
            .bind(to_db(total_rows))
            .bind(created_by)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn mark_running(&self, id: Uuid) -> Result<bool, JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'RUNNING', updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_progress(&self, id: Uuid, processed_rows: usize) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            UPDATE upload_jobs
            SET processed_rows = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(id)
        .bind(to_db(processed_rows))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, result: &IngestionResult) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'COMPLETED',
                success_count = $2,
                failure_count = $3,
                processed_rows = $2 + $3,
                row_errors = $4,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('COMPLETED', 'FAILED')
            "#,
        )
        .bind(id)
        .bind(to_db(result.success_count))
        .bind(to_db(result.failure_count))
        .bind(Json(&result.errors))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'FAILED',
                row_errors = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('COMPLETED', 'FAILED')
            "#,
        )
        .bind(id)
        .bind(Json(vec![failure_error(message)]))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<UploadJob>, JobStoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM upload_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, UploadJobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(UploadJob::try_from).transpose()
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<UploadJob>, JobStoreError> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM upload_jobs
            WHERE ($1::text IS NULL OR entity_type = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, UploadJobRow>(&sql)
            .bind(filter.entity_type.map(EntityType::as_str))
            .bind(filter.status.map(JobStatus::as_str))
            .bind(to_db(filter.effective_limit()))
            .bind(to_db(filter.effective_offset()))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(UploadJob::try_from).collect()
    }
}
