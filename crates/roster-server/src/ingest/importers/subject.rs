use async_trait::async_trait;
use roster_common::EntityType;
use std::collections::HashMap;
use uuid::Uuid;

use super::{mismatched_record, rejected_batch, skipped_rows, EntityImporter};
use crate::ingest::pipeline::PipelineError;
use crate::ingest::records::{Record, SubjectRecord};
use crate::ingest::store::{NewSubject, RecordStore};
use crate::ingest::types::{IngestionError, KeyField, ResolvedRow, Scope, UniqueField};
use crate::ingest::validator::RowReader;

const HEADERS: &[&str] = &["subject_code", "subject_name"];

const UNIQUE: &[UniqueField] = &[UniqueField {
    field: KeyField::SubjectCode,
    scope: Scope::Subjects,
}];

pub struct SubjectImporter;

#[async_trait]
impl EntityImporter for SubjectImporter {
    fn entity_type(&self) -> EntityType {
        EntityType::Subject
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
        let subject_code = reader.required("subject_code");
        let subject_name = reader.required("subject_name");

        match (subject_code, subject_name) {
            (Some(subject_code), Some(subject_name)) => Ok(Record::Subject(SubjectRecord {
                subject_code,
                subject_name,
            })),
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
        let mut batch = Vec::with_capacity(rows.len());
        let mut inserts = Vec::with_capacity(rows.len());

        for row in rows {
            let Record::Subject(subject) = &row.record else {
                errors.push(mismatched_record(row, EntityType::Subject));
                continue;
            };
            let id = Uuid::new_v4();
            batch.push((row.row_number, id));
            inserts.push(NewSubject {
                id,
                subject_code: subject.subject_code.clone(),
                subject_name: subject.subject_name.clone(),
            });
        }

        match store.insert_subjects(&inserts).await {
            Ok(skipped) => errors.extend(skipped_rows(
                &batch,
                &skipped,
                KeyField::SubjectCode,
                Scope::Subjects,
            )),
            Err(err) => {
                let numbers: Vec<usize> = batch.iter().map(|(row, _)| *row).collect();
                errors.extend(rejected_batch(&numbers, err)?);
            }
        }

        Ok(errors)
    }
}
