use chrono::{DateTime, Utc};
use roster_common::{EntityType, JobStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest::IngestionError;

/// One queued import and its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadJob {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub status: JobStatus,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub row_errors: Vec<IngestionError>,
    pub created_by: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadJob {
    pub fn new(entity_type: EntityType, total_rows: usize, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            entity_type,
            status: JobStatus::Pending,
            total_rows,
            processed_rows: 0,
            success_count: 0,
            failure_count: 0,
            row_errors: Vec::new(),
            created_by: created_by.into(),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = UploadJob::new(EntityType::Room, 12, "admin");

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_rows, 12);
        assert_eq!(job.processed_rows, 0);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let job = UploadJob::new(EntityType::Timetable, 3, "admin");
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["entityType"], "TIMETABLE_IMPORT");
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["totalRows"], 3);
        assert_eq!(value["rowErrors"], serde_json::json!([]));
    }
}
