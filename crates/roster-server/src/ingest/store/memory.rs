//! In-memory record store
//!
//! Enforces the same uniqueness rules as the Postgres schema so imports
//! behave identically in tests and local runs without a database.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    key_column, NewClass, NewRoom, NewStudent, NewSubject, NewTeacher, NewTimetableEntry,
    RecordStore, StoreError,
};
use crate::ingest::types::{KeyField, Scope};

#[derive(Debug, Default)]
struct Tables {
    classes: Vec<NewClass>,
    subjects: Vec<NewSubject>,
    rooms: Vec<NewRoom>,
    students: Vec<NewStudent>,
    teachers: Vec<NewTeacher>,
    timetable: Vec<NewTimetableEntry>,
}

impl Tables {
    /// `(key value, id)` pairs for a lookup-capable scope
    fn keyed(&self, scope: Scope) -> Vec<(&str, Uuid)> {
        match scope {
            Scope::Classes => self.classes.iter().map(|c| (c.class_name.as_str(), c.id)).collect(),
            Scope::Subjects => self.subjects.iter().map(|s| (s.subject_code.as_str(), s.id)).collect(),
            Scope::Rooms => self.rooms.iter().map(|r| (r.room_number.as_str(), r.id)).collect(),
            Scope::Students => self
                .students
                .iter()
                .map(|s| (s.registration_number.as_str(), s.id))
                .collect(),
            Scope::Teachers => self.teachers.iter().map(|t| (t.teacher_id.as_str(), t.id)).collect(),
            Scope::Users => self
                .students
                .iter()
                .map(|s| &s.user)
                .chain(self.teachers.iter().map(|t| &t.user))
                .map(|u| (u.email.as_str(), u.id))
                .collect(),
        }
    }

    fn keys(&self, scope: Scope) -> HashSet<String> {
        self.keyed(scope).into_iter().map(|(k, _)| k.to_string()).collect()
    }

    fn slot_taken(&self, entry: &NewTimetableEntry) -> bool {
        self.timetable.iter().any(|e| {
            e.class_id == entry.class_id
                && e.day_of_week == entry.day_of_week
                && e.start_time == entry.start_time
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Mutex<Tables>,
    unavailable: Mutex<Option<String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a transient error until cleared
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *lock(&self.unavailable) = reason.map(str::to_string);
    }

    pub fn count(&self, scope: Scope) -> usize {
        self.tables().keyed(scope).len()
    }

    pub fn timetable_entries(&self) -> Vec<NewTimetableEntry> {
        self.tables().timetable.clone()
    }

    pub fn students(&self) -> Vec<NewStudent> {
        self.tables().students.clone()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        lock(&self.tables)
    }

    fn available(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if let Some(reason) = lock(&self.unavailable).clone() {
            return Err(StoreError::Unavailable(reason));
        }
        Ok(self.tables())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Append rows whose key is free, returning the ids of the rest
fn insert_unique<T: Clone>(
    table: &mut Vec<T>,
    taken: &mut HashSet<String>,
    rows: &[T],
    key: impl Fn(&T) -> &str,
    id: impl Fn(&T) -> Uuid,
) -> Vec<Uuid> {
    let mut skipped = Vec::new();
    for row in rows {
        if taken.insert(key(row).to_string()) {
            table.push(row.clone());
        } else {
            skipped.push(id(row));
        }
    }
    skipped
}

fn violation(constraint: &str, value: &str) -> StoreError {
    StoreError::Rejected(format!(
        "duplicate key value violates unique constraint \"{}\" ({})",
        constraint, value
    ))
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn has_records(&self, scope: Scope) -> Result<bool, StoreError> {
        Ok(!self.available()?.keyed(scope).is_empty())
    }

    async fn lookup_ids(
        &self,
        scope: Scope,
        field: KeyField,
        values: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        key_column(scope, field)?;
        let wanted: HashSet<&str> = values.iter().map(String::as_str).collect();

        Ok(self
            .available()?
            .keyed(scope)
            .into_iter()
            .filter(|(key, _)| wanted.contains(key))
            .map(|(key, id)| (key.to_string(), id.to_string()))
            .collect())
    }

    async fn existing_values(
        &self,
        scope: Scope,
        field: KeyField,
        values: &[String],
    ) -> Result<Vec<String>, StoreError> {
        key_column(scope, field)?;
        let existing = self.available()?.keys(scope);

        Ok(values
            .iter()
            .filter(|v| existing.contains(v.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_classes(&self, rows: &[NewClass]) -> Result<Vec<Uuid>, StoreError> {
        let mut tables = self.available()?;
        let mut taken = tables.keys(Scope::Classes);
        Ok(insert_unique(&mut tables.classes, &mut taken, rows, |r| r.class_name.as_str(), |r| r.id))
    }

    async fn insert_subjects(&self, rows: &[NewSubject]) -> Result<Vec<Uuid>, StoreError> {
        let mut tables = self.available()?;
        let mut taken = tables.keys(Scope::Subjects);
        Ok(insert_unique(&mut tables.subjects, &mut taken, rows, |r| r.subject_code.as_str(), |r| r.id))
    }

    async fn insert_rooms(&self, rows: &[NewRoom]) -> Result<Vec<Uuid>, StoreError> {
        let mut tables = self.available()?;
        let mut taken = tables.keys(Scope::Rooms);
        Ok(insert_unique(&mut tables.rooms, &mut taken, rows, |r| r.room_number.as_str(), |r| r.id))
    }

    async fn insert_timetable(&self, rows: &[NewTimetableEntry]) -> Result<Vec<Uuid>, StoreError> {
        let mut tables = self.available()?;
        let mut skipped = Vec::new();
        for row in rows {
            if tables.slot_taken(row) {
                skipped.push(row.id);
            } else {
                tables.timetable.push(row.clone());
            }
        }
        Ok(skipped)
    }

    async fn insert_students(&self, rows: &[NewStudent]) -> Result<(), StoreError> {
        let mut tables = self.available()?;
        let mut emails = tables.keys(Scope::Users);
        let mut numbers = tables.keys(Scope::Students);

        for row in rows {
            if !emails.insert(row.user.email.clone()) {
                return Err(violation("users_email_key", &row.user.email));
            }
            if !numbers.insert(row.registration_number.clone()) {
                return Err(violation(
                    "students_registration_number_key",
                    &row.registration_number,
                ));
            }
        }

        tables.students.extend_from_slice(rows);
        Ok(())
    }

    async fn insert_teachers(&self, rows: &[NewTeacher]) -> Result<(), StoreError> {
        let mut tables = self.available()?;
        let mut emails = tables.keys(Scope::Users);
        let mut ids = tables.keys(Scope::Teachers);

        for row in rows {
            if !emails.insert(row.user.email.clone()) {
                return Err(violation("users_email_key", &row.user.email));
            }
            if !ids.insert(row.teacher_id.clone()) {
                return Err(violation("teachers_teacher_id_key", &row.teacher_id));
            }
        }

        tables.teachers.extend_from_slice(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::store::NewUser;

    fn class(name: &str) -> NewClass {
        NewClass {
            id: Uuid::new_v4(),
            class_name: name.to_string(),
            batch: "2024".to_string(),
        }
    }

    fn teacher(code: &str, email: &str) -> NewTeacher {
        NewTeacher {
            id: Uuid::new_v4(),
            user: NewUser {
                id: Uuid::new_v4(),
                name: "T".to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
            },
            teacher_id: code.to_string(),
        }
    }

    #[tokio::test]
    async fn test_conflicting_classes_are_skipped() {
        let store = MemoryRecordStore::new();
        let first = class("CSE-A");
        store.insert_classes(&[first]).await.unwrap();

        let again = class("CSE-A");
        let fresh = class("CSE-B");
        let skipped = store.insert_classes(&[again.clone(), fresh]).await.unwrap();

        assert_eq!(skipped, vec![again.id]);
        assert_eq!(store.count(Scope::Classes), 2);
    }

    #[tokio::test]
    async fn test_lookup_is_verbatim() {
        let store = MemoryRecordStore::new();
        let cse = class("CSE-A");
        store.insert_classes(&[cse.clone()]).await.unwrap();

        let found = store
            .lookup_ids(
                Scope::Classes,
                KeyField::ClassName,
                &["CSE-A".to_string(), "cse-a".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found.get("CSE-A"), Some(&cse.id.to_string()));
    }

    #[tokio::test]
    async fn test_teacher_batch_is_all_or_nothing() {
        let store = MemoryRecordStore::new();
        store
            .insert_teachers(&[teacher("T-1", "a@school.edu")])
            .await
            .unwrap();

        let result = store
            .insert_teachers(&[teacher("T-2", "b@school.edu"), teacher("T-3", "a@school.edu")])
            .await;

        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert_eq!(store.count(Scope::Teachers), 1);
        assert_eq!(store.count(Scope::Users), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_transient() {
        let store = MemoryRecordStore::new();
        store.set_unavailable(Some("connection refused"));

        let err = store.has_records(Scope::Classes).await.unwrap_err();
        assert!(err.is_transient());

        store.set_unavailable(None);
        assert!(!store.has_records(Scope::Classes).await.unwrap());
    }
}
