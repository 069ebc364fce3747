use async_trait::async_trait;
use roster_common::EntityType;
use std::collections::HashMap;
use uuid::Uuid;

use super::{mismatched_record, reference_id, rejected_batch, skipped_rows, EntityImporter};
use crate::ingest::pipeline::PipelineError;
use crate::ingest::records::{DayOfWeek, Record, TimetableRecord};
use crate::ingest::store::{NewTimetableEntry, RecordStore};
use crate::ingest::types::{ErrorCode, IngestionError, KeyField, Relation, ResolvedRow, Scope};
use crate::ingest::validator::RowReader;

const HEADERS: &[&str] = &[
    "class_name",
    "teacher_id",
    "subject_code",
    "room_number",
    "day_of_week",
    "start_time",
    "end_time",
];

const RELATIONS: &[Relation] = &[
    Relation {
        column: KeyField::ClassName,
        target: Scope::Classes,
        lookup: KeyField::ClassName,
    },
    Relation {
        column: KeyField::TeacherId,
        target: Scope::Teachers,
        lookup: KeyField::TeacherId,
    },
    Relation {
        column: KeyField::SubjectCode,
        target: Scope::Subjects,
        lookup: KeyField::SubjectCode,
    },
    Relation {
        column: KeyField::RoomNumber,
        target: Scope::Rooms,
        lookup: KeyField::RoomNumber,
    },
];

const PRECONDITIONS: &[Scope] = &[Scope::Classes, Scope::Teachers, Scope::Subjects, Scope::Rooms];

pub struct TimetableImporter;

impl TimetableImporter {
    fn entry(row: &ResolvedRow, slot: &TimetableRecord) -> Result<NewTimetableEntry, IngestionError> {
        Ok(NewTimetableEntry {
            id: Uuid::new_v4(),
            class_id: reference_id(row, KeyField::ClassName)?,
            teacher_id: reference_id(row, KeyField::TeacherId)?,
            subject_id: reference_id(row, KeyField::SubjectCode)?,
            room_id: reference_id(row, KeyField::RoomNumber)?,
            day_of_week: slot.day_of_week.as_str().to_string(),
            start_time: slot.start_time,
            end_time: slot.end_time,
        })
    }
}

#[async_trait]
impl EntityImporter for TimetableImporter {
    fn entity_type(&self) -> EntityType {
        EntityType::Timetable
    }

    fn expected_headers(&self) -> &'static [&'static str] {
        HEADERS
    }

    fn validate_row(
        &self,
        fields: &HashMap<String, String>,
        row: usize,
    ) -> Result<Record, Vec<IngestionError>> {
        let mut reader = RowReader::new(fields, row);
        let class_name = reader.required("class_name");
        let teacher_id = reader.required("teacher_id");
        let subject_code = reader.required("subject_code");
        let room_number = reader.required("room_number");
        let day_of_week = reader.one_of("day_of_week", &DayOfWeek::ALL, DayOfWeek::as_str);
        let start_time = reader.time_of_day("start_time");
        let end_time = reader.time_of_day("end_time");

        let (
            Some(class_name),
            Some(teacher_id),
            Some(subject_code),
            Some(room_number),
            Some(day_of_week),
            Some(start_time),
            Some(end_time),
        ) = (class_name, teacher_id, subject_code, room_number, day_of_week, start_time, end_time)
        else {
            return Err(reader.into_errors());
        };

        if start_time >= end_time {
            return Err(vec![IngestionError::new(
                row,
                "end_time",
                ErrorCode::InvalidFormat,
                "start_time must be before end_time",
            )]);
        }

        Ok(Record::Timetable(TimetableRecord {
            class_name,
            teacher_id,
            subject_code,
            room_number,
            day_of_week,
            start_time,
            end_time,
        }))
    }

    fn relations(&self) -> &'static [Relation] {
        RELATIONS
    }

    fn preconditions(&self) -> &'static [Scope] {
        PRECONDITIONS
    }

    fn checks_schedule_overlaps(&self) -> bool {
        true
    }

    async fn persist(
        &self,
        store: &dyn RecordStore,
        rows: &[ResolvedRow],
    ) -> Result<Vec<IngestionError>, PipelineError> {
        let mut errors = Vec::new();
        let mut batch = Vec::with_capacity(rows.len());
        let mut inserts = Vec::with_capacity(rows.len());

        for row in rows {
            let Record::Timetable(slot) = &row.record else {
                errors.push(mismatched_record(row, EntityType::Timetable));
                continue;
            };
            match Self::entry(row, slot) {
                Ok(entry) => {
                    batch.push((row.row_number, entry.id));
                    inserts.push(entry);
                }
                Err(err) => errors.push(err),
            }
        }

        match store.insert_timetable(&inserts).await {
            // Skips come from the (class, day, start) unique slot
            Ok(skipped) => errors.extend(skipped_rows(&batch, &skipped, KeyField::ClassName, Scope::Classes)),
            Err(err) => {
                let numbers: Vec<usize> = batch.iter().map(|(row, _)| *row).collect();
                errors.extend(rejected_batch(&numbers, err)?);
            }
        }

        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::fields;
    use super::*;

    fn slot(day: &str, start: &str, end: &str) -> HashMap<String, String> {
        fields(&[
            ("class_name", "CSE-A"),
            ("teacher_id", "T-1"),
            ("subject_code", "CS101"),
            ("room_number", "R1"),
            ("day_of_week", day),
            ("start_time", start),
            ("end_time", end),
        ])
    }

    #[test]
    fn test_valid_slot() {
        let record = TimetableImporter
            .validate_row(&slot("Monday", "09:00", "10:00"), 1)
            .unwrap();

        let slot = record.as_timetable().unwrap();
        assert_eq!(slot.day_of_week, DayOfWeek::Monday);
        assert_eq!(slot.start_time.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn test_sunday_is_not_schedulable() {
        let errors = TimetableImporter
            .validate_row(&slot("Sunday", "09:00", "10:00"), 1)
            .unwrap_err();

        assert_eq!(errors[0].code, ErrorCode::InvalidEnum);
        assert_eq!(errors[0].column, "day_of_week");
    }

    #[test]
    fn test_end_must_follow_start() {
        let errors = TimetableImporter
            .validate_row(&slot("Friday", "10:00", "10:00"), 5)
            .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].column, "end_time");
        assert_eq!(errors[0].code, ErrorCode::InvalidFormat);
        assert_eq!(errors[0].message, "start_time must be before end_time");
    }

    #[test]
    fn test_order_check_skipped_when_times_malformed() {
        let errors = TimetableImporter
            .validate_row(&slot("Friday", "9am", "08:00"), 2)
            .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].column, "start_time");
        assert_eq!(errors[0].message, "Must be HH:mm format");
    }
}
