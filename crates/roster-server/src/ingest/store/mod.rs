//! Record store interface
//!
//! The pipeline reaches storage only through [`RecordStore`]: batched key
//! lookups for relation resolution and duplicate checks, emptiness checks
//! for preconditions, and one insert routine per entity type.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveTime;
use std::collections::HashMap;
use uuid::Uuid;

use super::types::{KeyField, Scope};

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connectivity, pool, protocol or transient server failure
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// The store refused the write because of the data itself
    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("{scope} records cannot be looked up by {field}")]
    UnsupportedLookup { scope: Scope, field: KeyField },
}

impl StoreError {
    /// Whether retrying the whole import later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Unavailable(_))
    }
}

/// SQLSTATE class 23: unique, foreign key, not-null and check violations
pub fn is_integrity_violation(sqlstate: Option<&str>) -> bool {
    sqlstate.is_some_and(|code| code.starts_with("23"))
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if is_integrity_violation(db.code().as_deref()) => {
                StoreError::Rejected(db.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Table and column backing a `(scope, field)` lookup
pub fn key_column(scope: Scope, field: KeyField) -> Result<(&'static str, &'static str), StoreError> {
    match (scope, field) {
        (Scope::Classes, KeyField::ClassName) => Ok(("classes", "class_name")),
        (Scope::Subjects, KeyField::SubjectCode) => Ok(("subjects", "subject_code")),
        (Scope::Rooms, KeyField::RoomNumber) => Ok(("rooms", "room_number")),
        (Scope::Students, KeyField::RegistrationNumber) => Ok(("students", "registration_number")),
        (Scope::Teachers, KeyField::TeacherId) => Ok(("teachers", "teacher_id")),
        (Scope::Users, KeyField::Email) => Ok(("users", "email")),
        _ => Err(StoreError::UnsupportedLookup { scope, field }),
    }
}

pub fn scope_table(scope: Scope) -> &'static str {
    match scope {
        Scope::Classes => "classes",
        Scope::Subjects => "subjects",
        Scope::Rooms => "rooms",
        Scope::Students => "students",
        Scope::Teachers => "teachers",
        Scope::Users => "users",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClass {
    pub id: Uuid,
    pub class_name: String,
    pub batch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubject {
    pub id: Uuid,
    pub subject_code: String,
    pub subject_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub id: Uuid,
    pub room_number: String,
    pub building_name: String,
    pub floor_number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimetableEntry {
    pub id: Uuid,
    pub class_id: Uuid,
    pub teacher_id: Uuid,
    pub subject_id: Uuid,
    pub room_id: Uuid,
    pub day_of_week: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// User account plus login credentials shared by students and teachers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub id: Uuid,
    pub user: NewUser,
    pub registration_number: String,
    pub class_id: Uuid,
    pub enrollment_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTeacher {
    pub id: Uuid,
    pub user: NewUser,
    pub teacher_id: String,
}

/// Storage operations needed by the ingestion pipeline
///
/// Simple inserts skip rows that collide with existing records and return
/// the ids of the skipped rows. Student and teacher inserts span several
/// tables and are all-or-nothing per call.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn has_records(&self, scope: Scope) -> Result<bool, StoreError>;

    /// Map each matching value to the id of its record, as text
    async fn lookup_ids(
        &self,
        scope: Scope,
        field: KeyField,
        values: &[String],
    ) -> Result<HashMap<String, String>, StoreError>;

    /// Values from `values` that already exist, compared verbatim
    async fn existing_values(
        &self,
        scope: Scope,
        field: KeyField,
        values: &[String],
    ) -> Result<Vec<String>, StoreError>;

    async fn insert_classes(&self, rows: &[NewClass]) -> Result<Vec<Uuid>, StoreError>;

    async fn insert_subjects(&self, rows: &[NewSubject]) -> Result<Vec<Uuid>, StoreError>;

    async fn insert_rooms(&self, rows: &[NewRoom]) -> Result<Vec<Uuid>, StoreError>;

    async fn insert_timetable(&self, rows: &[NewTimetableEntry]) -> Result<Vec<Uuid>, StoreError>;

    async fn insert_students(&self, rows: &[NewStudent]) -> Result<(), StoreError>;

    async fn insert_teachers(&self, rows: &[NewTeacher]) -> Result<(), StoreError>;
}
