//! Wire-level types shared by the upload boundary, the queue and the worker

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RosterError};

/// The six importable record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "CLASS_IMPORT")]
    Class,
    #[serde(rename = "SUBJECT_IMPORT")]
    Subject,
    #[serde(rename = "ROOM_IMPORT")]
    Room,
    #[serde(rename = "STUDENT_IMPORT")]
    Student,
    #[serde(rename = "TEACHER_IMPORT")]
    Teacher,
    #[serde(rename = "TIMETABLE_IMPORT")]
    Timetable,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Class,
        EntityType::Subject,
        EntityType::Room,
        EntityType::Student,
        EntityType::Teacher,
        EntityType::Timetable,
    ];

    /// Name used on the wire and in the `upload_jobs.entity_type` column
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Class => "CLASS_IMPORT",
            EntityType::Subject => "SUBJECT_IMPORT",
            EntityType::Room => "ROOM_IMPORT",
            EntityType::Student => "STUDENT_IMPORT",
            EntityType::Teacher => "TEACHER_IMPORT",
            EntityType::Timetable => "TIMETABLE_IMPORT",
        }
    }

    /// Durable work queue carrying jobs of this type
    pub fn queue_name(self) -> &'static str {
        match self {
            EntityType::Class => "class_import",
            EntityType::Subject => "subject_import",
            EntityType::Room => "room_import",
            EntityType::Student => "student_import",
            EntityType::Teacher => "teacher_import",
            EntityType::Timetable => "timetable_import",
        }
    }

    /// Plural path segment, e.g. `/uploads/classes`
    pub fn slug(self) -> &'static str {
        match self {
            EntityType::Class => "classes",
            EntityType::Subject => "subjects",
            EntityType::Room => "rooms",
            EntityType::Student => "students",
            EntityType::Teacher => "teachers",
            EntityType::Timetable => "timetable",
        }
    }

    pub fn from_queue_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.queue_name() == name)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = RosterError;

    /// Accepts the wire name, the queue name or the plural slug
    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| {
                t.as_str().eq_ignore_ascii_case(needle)
                    || t.queue_name().eq_ignore_ascii_case(needle)
                    || t.slug().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| RosterError::UnknownEntityType(s.to_string()))
    }
}

/// Lifecycle state of an upload job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(RosterError::UnknownJobStatus(s.to_string())),
        }
    }
}

/// Queue payload describing one import to run
///
/// The CSV text travels base64-encoded so the JSON body stays ASCII.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub job_id: Uuid,
    pub entity_type: EntityType,
    pub total_rows: usize,
    pub csv_payload: String,
}

impl JobMessage {
    pub fn new(job_id: Uuid, entity_type: EntityType, total_rows: usize, csv_text: &str) -> Self {
        Self {
            job_id,
            entity_type,
            total_rows,
            csv_payload: STANDARD.encode(csv_text.as_bytes()),
        }
    }

    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode the embedded CSV text
    pub fn csv_text(&self) -> Result<String> {
        let bytes = STANDARD
            .decode(self.csv_payload.as_bytes())
            .map_err(|e| RosterError::Payload(format!("invalid base64: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| RosterError::Payload(format!("invalid UTF-8: {}", e)))
    }
}
