//! Per-entity import rules
//!
//! Each entity type is one [`EntityImporter`]: the header contract, the row
//! schema, the relations and uniqueness rules, the preconditions and the
//! persistence routine. The pipeline is written once against this trait.

mod class;
mod room;
mod student;
mod subject;
mod teacher;
mod timetable;

pub use class::ClassImporter;
pub use room::RoomImporter;
pub use student::StudentImporter;
pub use subject::SubjectImporter;
pub use teacher::TeacherImporter;
pub use timetable::TimetableImporter;

use async_trait::async_trait;
use roster_common::EntityType;
use std::collections::HashMap;
use uuid::Uuid;

use super::pipeline::PipelineError;
use super::records::Record;
use super::store::{RecordStore, StoreError};
use super::types::{
    ErrorCode, IngestionError, KeyField, Relation, ResolvedRow, Scope, UniqueField,
};

#[async_trait]
pub trait EntityImporter: Send + Sync {
    fn entity_type(&self) -> EntityType;

    fn expected_headers(&self) -> &'static [&'static str];

    /// Check one row against the schema and build its typed record
    fn validate_row(
        &self,
        fields: &HashMap<String, String>,
        row: usize,
    ) -> Result<Record, Vec<IngestionError>>;

    fn relations(&self) -> &'static [Relation] {
        &[]
    }

    fn unique_fields(&self) -> &'static [UniqueField] {
        &[]
    }

    /// Scopes that must hold at least one record before an import starts
    fn preconditions(&self) -> &'static [Scope] {
        &[]
    }

    /// Rows describe time slots that must not double-book rooms or teachers
    fn checks_schedule_overlaps(&self) -> bool {
        false
    }

    /// Write one batch, returning at most one error per rejected row
    async fn persist(
        &self,
        store: &dyn RecordStore,
        rows: &[ResolvedRow],
    ) -> Result<Vec<IngestionError>, PipelineError>;
}

pub(crate) fn mismatched_record(row: &ResolvedRow, expected: EntityType) -> IngestionError {
    IngestionError::new(
        row.row_number,
        "",
        ErrorCode::InsertFailed,
        format!("Row does not hold a {} record", expected),
    )
}

/// Identifier a relation column resolved to
pub(crate) fn reference_id(row: &ResolvedRow, column: KeyField) -> Result<Uuid, IngestionError> {
    row.reference(column)
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| {
            IngestionError::new(
                row.row_number,
                column.as_str(),
                ErrorCode::InsertFailed,
                format!("No resolved identifier for '{}'", column),
            )
        })
}

/// Turn the ids skipped by a conflict-tolerant insert into row errors
pub(crate) fn skipped_rows(
    batch: &[(usize, Uuid)],
    skipped: &[Uuid],
    column: KeyField,
    scope: Scope,
) -> Vec<IngestionError> {
    batch
        .iter()
        .filter(|(_, id)| skipped.contains(id))
        .map(|(row, _)| {
            IngestionError::new(
                *row,
                column.as_str(),
                ErrorCode::InsertFailed,
                format!("Conflicts with an existing {} record", scope),
            )
        })
        .collect()
}

/// Mark every row of a batch as failed when the store refused the write
///
/// Transient failures propagate so the whole import can be retried.
pub(crate) fn rejected_batch(
    rows: &[usize],
    err: StoreError,
) -> Result<Vec<IngestionError>, PipelineError> {
    match err {
        StoreError::Rejected(reason) => Ok(rows
            .iter()
            .map(|row| {
                IngestionError::new(
                    *row,
                    "",
                    ErrorCode::InsertFailed,
                    format!("Batch insert failed: {}", reason),
                )
            })
            .collect()),
        other => Err(other.into()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    pub fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
