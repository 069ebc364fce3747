use async_trait::async_trait;
use roster_common::EntityType;
use std::collections::HashMap;
use uuid::Uuid;

use super::{mismatched_record, rejected_batch, EntityImporter};
use crate::ingest::password::PasswordHasher;
use crate::ingest::pipeline::PipelineError;
use crate::ingest::records::{Record, TeacherRecord};
use crate::ingest::store::{NewTeacher, NewUser, RecordStore};
use crate::ingest::types::{IngestionError, KeyField, ResolvedRow, Scope, UniqueField};
use crate::ingest::validator::RowReader;

use super::student::MIN_PASSWORD_LENGTH;

const HEADERS: &[&str] = &["teacher_id", "name", "email", "password"];

const UNIQUE: &[UniqueField] = &[
    UniqueField {
        field: KeyField::TeacherId,
        scope: Scope::Teachers,
    },
    UniqueField {
        field: KeyField::Email,
        scope: Scope::Users,
    },
];

pub struct TeacherImporter {
    hasher: PasswordHasher,
}

impl TeacherImporter {
    pub fn new(hasher: PasswordHasher) -> Self {
        Self { hasher }
    }
}

#[async_trait]
impl EntityImporter for TeacherImporter {
    fn entity_type(&self) -> EntityType {
        EntityType::Teacher
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
        let teacher_id = reader.required("teacher_id");
        let name = reader.required("name");
        let email = reader.email("email");
        let password = reader.min_length("password", MIN_PASSWORD_LENGTH);

        match (teacher_id, name, email, password) {
            (Some(teacher_id), Some(name), Some(email), Some(password)) => {
                Ok(Record::Teacher(TeacherRecord {
                    teacher_id,
                    name,
                    email,
                    password,
                }))
            }
            _ => Err(reader.into_errors()),
        }
    }

    fn unique_fields(&self) -> &'static [UniqueField] {
        UNIQUE
    }

    async fn persist(
        &self,
        store: &dyn RecordStore,
        rows: &[ResolvedRow],
    ) -> Result<Vec<IngestionError>, PipelineError> {
        let mut errors = Vec::new();
        let mut ready: Vec<(usize, &TeacherRecord)> = Vec::with_capacity(rows.len());

        for row in rows {
            match &row.record {
                Record::Teacher(teacher) => ready.push((row.row_number, teacher)),
                _ => errors.push(mismatched_record(row, EntityType::Teacher)),
            }
        }

        if ready.is_empty() {
            return Ok(errors);
        }

        let hashes = self
            .hasher
            .hash_all(ready.iter().map(|(_, t)| t.password.clone()).collect())
            .await?;

        let inserts: Vec<NewTeacher> = ready
            .iter()
            .zip(hashes)
            .map(|((_, teacher), password_hash)| NewTeacher {
                id: Uuid::new_v4(),
                user: NewUser {
                    id: Uuid::new_v4(),
                    name: teacher.name.clone(),
                    email: teacher.email.clone(),
                    password_hash,
                },
                teacher_id: teacher.teacher_id.clone(),
            })
            .collect();

        if let Err(err) = store.insert_teachers(&inserts).await {
            let numbers: Vec<usize> = ready.iter().map(|(row, _)| *row).collect();
            errors.extend(rejected_batch(&numbers, err)?);
        }

        Ok(errors)
    }
}
