//! Uniqueness and scheduling checks across rows
//!
//! Each check only reports; the pipeline drops every row that received an
//! error before the next stage.

use std::collections::{HashMap, HashSet};

use super::records::{DayOfWeek, TimetableRecord};
use super::store::{RecordStore, StoreError};
use super::types::{ErrorCode, IngestionError, RowView, UniqueField};

/// Trimmed, case-folded form used for uniqueness comparisons
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Later occurrences of a unique value within the file
pub fn find_in_file_duplicates<R: RowView>(rows: &[R], unique: &[UniqueField]) -> Vec<IngestionError> {
    let mut errors = Vec::new();

    for rule in unique {
        let mut first_seen: HashMap<String, usize> = HashMap::new();

        for row in rows {
            let Some(value) = row.record().field(rule.field) else {
                continue;
            };
            let key = normalize(value);
            if key.is_empty() {
                continue;
            }

            match first_seen.get(&key) {
                Some(first_row) => errors.push(IngestionError::new(
                    row.row_number(),
                    rule.field.as_str(),
                    ErrorCode::DuplicateInFile,
                    format!(
                        "Duplicate '{}' value '{}', first seen at row {}",
                        rule.field, value, first_row
                    ),
                )),
                None => {
                    first_seen.insert(key, row.row_number());
                }
            }
        }
    }

    errors
}

/// Rows whose unique values already exist in the store
///
/// The store is queried with the first-seen text of each value, verbatim.
/// A match flags every row sharing that value's normalized form.
pub async fn find_store_duplicates<R: RowView>(
    store: &dyn RecordStore,
    rows: &[R],
    unique: &[UniqueField],
) -> Result<Vec<IngestionError>, StoreError> {
    let mut errors = Vec::new();

    for rule in unique {
        let mut candidates: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for value in rows.iter().filter_map(|r| r.record().field(rule.field)) {
            let trimmed = value.trim();
            if !trimmed.is_empty() && seen.insert(normalize(trimmed)) {
                candidates.push(trimmed.to_string());
            }
        }

        if candidates.is_empty() {
            continue;
        }

        let existing: HashSet<String> = store
            .existing_values(rule.scope, rule.field, &candidates)
            .await?
            .iter()
            .map(|v| normalize(v))
            .collect();

        if existing.is_empty() {
            continue;
        }

        for row in rows {
            let Some(value) = row.record().field(rule.field) else {
                continue;
            };
            if existing.contains(&normalize(value)) {
                errors.push(IngestionError::new(
                    row.row_number(),
                    rule.field.as_str(),
                    ErrorCode::DuplicateInDb,
                    format!("'{}' value '{}' already exists in database", rule.field, value),
                ));
            }
        }
    }

    Ok(errors)
}

#[derive(Clone, Copy)]
enum Dimension {
    Room,
    Teacher,
}

impl Dimension {
    fn column(self) -> &'static str {
        match self {
            Dimension::Room => "room_number",
            Dimension::Teacher => "teacher_id",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Dimension::Room => "Room",
            Dimension::Teacher => "Teacher",
        }
    }

    fn key(self, slot: &TimetableRecord) -> &str {
        match self {
            Dimension::Room => &slot.room_number,
            Dimension::Teacher => &slot.teacher_id,
        }
    }
}

/// Double bookings of a room or a teacher on the same day
///
/// Slots are half-open `[start, end)`. Within a group sorted by start time,
/// every pair where the later slot starts before the earlier one ends is
/// reported once, on the later slot.
pub fn find_schedule_overlaps<R: RowView>(rows: &[R]) -> Vec<IngestionError> {
    let slots: Vec<(usize, &TimetableRecord)> = rows
        .iter()
        .filter_map(|r| r.record().as_timetable().map(|slot| (r.row_number(), slot)))
        .collect();

    let mut errors = Vec::new();
    for dimension in [Dimension::Room, Dimension::Teacher] {
        errors.extend(overlaps_in(dimension, &slots));
    }
    errors
}

fn overlaps_in(dimension: Dimension, slots: &[(usize, &TimetableRecord)]) -> Vec<IngestionError> {
    let mut order: Vec<(&str, DayOfWeek)> = Vec::new();
    let mut groups: HashMap<(&str, DayOfWeek), Vec<(usize, &TimetableRecord)>> = HashMap::new();

    for &(row, slot) in slots {
        let key = (dimension.key(slot), slot.day_of_week);
        let group = groups.entry(key).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        group.push((row, slot));
    }

    let mut errors = Vec::new();
    for key in order {
        let Some(group) = groups.get_mut(&key) else {
            continue;
        };
        group.sort_by_key(|(_, slot)| slot.start_time);

        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                let (earlier_row, earlier) = group[i];
                let (later_row, later) = group[j];
                if later.start_time < earlier.end_time {
                    errors.push(IngestionError::new(
                        later_row,
                        dimension.column(),
                        ErrorCode::ConflictOverlap,
                        format!(
                            "{} double-booked on {}, conflicts with row {}",
                            dimension.label(),
                            later.day_of_week,
                            earlier_row
                        ),
                    ));
                }
            }
        }
    }

    errors
}
