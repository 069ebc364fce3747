use async_trait::async_trait;
use roster_common::EntityType;
use std::collections::HashMap;
use uuid::Uuid;

use super::{mismatched_record, reference_id, rejected_batch, EntityImporter};
use crate::ingest::password::PasswordHasher;
use crate::ingest::pipeline::PipelineError;
use crate::ingest::records::{EnrollmentStatus, Record, StudentRecord};
use crate::ingest::store::{NewStudent, NewUser, RecordStore};
use crate::ingest::types::{
    IngestionError, KeyField, Relation, ResolvedRow, Scope, UniqueField,
};
use crate::ingest::validator::RowReader;

const HEADERS: &[&str] = &[
    "registration_number",
    "name",
    "email",
    "password",
    "class_name",
    "enrollment_status",
];

const RELATIONS: &[Relation] = &[Relation {
    column: KeyField::ClassName,
    target: Scope::Classes,
    lookup: KeyField::ClassName,
}];

const UNIQUE: &[UniqueField] = &[
    UniqueField {
        field: KeyField::RegistrationNumber,
        scope: Scope::Students,
    },
    UniqueField {
        field: KeyField::Email,
        scope: Scope::Users,
    },
];

const PRECONDITIONS: &[Scope] = &[Scope::Classes];

pub const MIN_PASSWORD_LENGTH: usize = 6;

pub struct StudentImporter {
    hasher: PasswordHasher,
}

impl StudentImporter {
    pub fn new(hasher: PasswordHasher) -> Self {
        Self { hasher }
    }
}

#[async_trait]
impl EntityImporter for StudentImporter {
    fn entity_type(&self) -> EntityType {
        EntityType::Student
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
        let registration_number = reader.required("registration_number");
        let name = reader.required("name");
        let email = reader.email("email");
        let password = reader.min_length("password", MIN_PASSWORD_LENGTH);
        let class_name = reader.required("class_name");
        let enrollment_status =
            reader.one_of("enrollment_status", &EnrollmentStatus::ALL, EnrollmentStatus::as_str);

        match (registration_number, name, email, password, class_name, enrollment_status) {
            (
                Some(registration_number),
                Some(name),
                Some(email),
                Some(password),
                Some(class_name),
                Some(enrollment_status),
            ) => Ok(Record::Student(StudentRecord {
                registration_number,
                name,
                email,
                password,
                class_name,
                enrollment_status,
            })),
            _ => Err(reader.into_errors()),
        }
    }

    fn relations(&self) -> &'static [Relation] {
        RELATIONS
    }

    fn unique_fields(&self) -> &'static [UniqueField] {
        UNIQUE
    }

    fn preconditions(&self) -> &'static [Scope] {
        PRECONDITIONS
    }

    /// Hashes the batch's passwords concurrently, then writes users,
    /// credentials and students in one transaction.
    async fn persist(
        &self,
        store: &dyn RecordStore,
        rows: &[ResolvedRow],
    ) -> Result<Vec<IngestionError>, PipelineError> {
        let mut errors = Vec::new();
        let mut ready: Vec<(usize, &StudentRecord, Uuid)> = Vec::with_capacity(rows.len());

        for row in rows {
            let Record::Student(student) = &row.record else {
                errors.push(mismatched_record(row, EntityType::Student));
                continue;
            };
            match reference_id(row, KeyField::ClassName) {
                Ok(class_id) => ready.push((row.row_number, student, class_id)),
                Err(err) => errors.push(err),
            }
        }

        if ready.is_empty() {
            return Ok(errors);
        }

        let hashes = self
            .hasher
            .hash_all(ready.iter().map(|(_, s, _)| s.password.clone()).collect())
            .await?;

        let inserts: Vec<NewStudent> = ready
            .iter()
            .zip(hashes)
            .map(|((_, student, class_id), password_hash)| NewStudent {
                id: Uuid::new_v4(),
                user: NewUser {
                    id: Uuid::new_v4(),
                    name: student.name.clone(),
                    email: student.email.clone(),
                    password_hash,
                },
                registration_number: student.registration_number.clone(),
                class_id: *class_id,
                enrollment_status: student.enrollment_status.as_str().to_string(),
            })
            .collect();

        if let Err(err) = store.insert_students(&inserts).await {
            let numbers: Vec<usize> = ready.iter().map(|(row, _, _)| *row).collect();
            errors.extend(rejected_batch(&numbers, err)?);
        }

        Ok(errors)
    }
}
