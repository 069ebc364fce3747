//! Core ingestion types
//!
//! Rows flow through the pipeline as `ParsedRow` -> `ValidatedRow` ->
//! `ResolvedRow`. Each stage builds new values instead of editing the
//! previous stage's output, and every failure becomes an `IngestionError`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::records::Record;

/// Failure class attached to every reported problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingHeader,
    ExtraHeader,
    ParseError,
    RequiredField,
    InvalidType,
    InvalidEnum,
    InvalidFormat,
    RelationNotFound,
    DuplicateInFile,
    DuplicateInDb,
    ConflictOverlap,
    InsertFailed,
    PreconditionFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingHeader => "MISSING_HEADER",
            ErrorCode::ExtraHeader => "EXTRA_HEADER",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::RequiredField => "REQUIRED_FIELD",
            ErrorCode::InvalidType => "INVALID_TYPE",
            ErrorCode::InvalidEnum => "INVALID_ENUM",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::RelationNotFound => "RELATION_NOT_FOUND",
            ErrorCode::DuplicateInFile => "DUPLICATE_IN_FILE",
            ErrorCode::DuplicateInDb => "DUPLICATE_IN_DB",
            ErrorCode::ConflictOverlap => "CONFLICT_OVERLAP",
            ErrorCode::InsertFailed => "INSERT_FAILED",
            ErrorCode::PreconditionFailed => "PRECONDITION_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported problem. `row` is 1-based; 0 means file or job level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionError {
    pub row: usize,
    pub column: String,
    pub code: ErrorCode,
    pub message: String,
}

impl IngestionError {
    pub fn new(
        row: usize,
        column: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            row,
            column: column.into(),
            code,
            message: message.into(),
        }
    }
}

/// Outcome of one import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionResult {
    pub total_rows: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<IngestionError>,
}

impl IngestionResult {
    /// Result of an import stopped by a gate before any row was processed
    pub fn aborted(errors: Vec<IngestionError>) -> Self {
        Self {
            errors,
            ..Self::default()
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.total_rows == 0 && !self.errors.is_empty()
    }
}

/// A data record from the CSV, keyed by lowercased header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub row_number: usize,
    pub fields: HashMap<String, String>,
}

impl ParsedRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

/// Storage collection targeted by lookups and precondition checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Classes,
    Subjects,
    Rooms,
    Students,
    Teachers,
    Users,
}

impl Scope {
    /// Singular display name used in messages
    pub fn label(self) -> &'static str {
        match self {
            Scope::Classes => "Class",
            Scope::Subjects => "Subject",
            Scope::Rooms => "Room",
            Scope::Students => "Student",
            Scope::Teachers => "Teacher",
            Scope::Users => "User",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Columns that take part in uniqueness checks or reference lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyField {
    ClassName,
    SubjectCode,
    RoomNumber,
    RegistrationNumber,
    TeacherId,
    Email,
}

impl KeyField {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyField::ClassName => "class_name",
            KeyField::SubjectCode => "subject_code",
            KeyField::RoomNumber => "room_number",
            KeyField::RegistrationNumber => "registration_number",
            KeyField::TeacherId => "teacher_id",
            KeyField::Email => "email",
        }
    }
}

impl std::fmt::Display for KeyField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column whose text must resolve to an identifier in `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub column: KeyField,
    pub target: Scope,
    pub lookup: KeyField,
}

/// A column whose values must be unique within the file and within `scope`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueField {
    pub field: KeyField,
    pub scope: Scope,
}

/// Common view over rows that carry a validated record
pub trait RowView {
    fn row_number(&self) -> usize;
    fn record(&self) -> &Record;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRow {
    pub row_number: usize,
    pub record: Record,
}

/// A validated row plus the identifiers its relation columns resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRow {
    pub row_number: usize,
    pub record: Record,
    pub references: HashMap<KeyField, String>,
}

impl ResolvedRow {
    pub fn unresolved(row: ValidatedRow) -> Self {
        Self {
            row_number: row.row_number,
            record: row.record,
            references: HashMap::new(),
        }
    }

    pub fn reference(&self, column: KeyField) -> Option<&str> {
        self.references.get(&column).map(String::as_str)
    }
}

impl RowView for ValidatedRow {
    fn row_number(&self) -> usize {
        self.row_number
    }

    fn record(&self) -> &Record {
        &self.record
    }
}

impl RowView for ResolvedRow {
    fn row_number(&self) -> usize {
        self.row_number
    }

    fn record(&self) -> &Record {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::DuplicateInDb).unwrap();
        assert_eq!(json, "\"DUPLICATE_IN_DB\"");
        assert_eq!(ErrorCode::ConflictOverlap.to_string(), "CONFLICT_OVERLAP");
    }

    #[test]
    fn test_aborted_result_has_no_rows() {
        let result = IngestionResult::aborted(vec![IngestionError::new(
            0,
            "region",
            ErrorCode::ExtraHeader,
            "Unexpected CSV header: 'region'",
        )]);

        assert!(result.is_aborted());
        assert_eq!(result.total_rows, 0);
        assert_eq!(result.success_count + result.failure_count, 0);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let value = serde_json::to_value(IngestionResult::default()).unwrap();
        assert!(value.get("successCount").is_some());
        assert!(value.get("failureCount").is_some());
    }
}
