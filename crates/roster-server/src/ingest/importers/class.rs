use async_trait::async_trait;
use roster_common::EntityType;
use std::collections::HashMap;
use uuid::Uuid;

use super::{mismatched_record, rejected_batch, skipped_rows, EntityImporter};
use crate::ingest::pipeline::PipelineError;
use crate::ingest::records::{ClassRecord, Record};
use crate::ingest::store::{NewClass, RecordStore};
use crate::ingest::types::{IngestionError, KeyField, ResolvedRow, Scope, UniqueField};
use crate::ingest::validator::RowReader;

const HEADERS: &[&str] = &["class_name", "batch"];

const UNIQUE: &[UniqueField] = &[UniqueField {
    field: KeyField::ClassName,
    scope: Scope::Classes,
}];

pub struct ClassImporter;

#[async_trait]
impl EntityImporter for ClassImporter {
    fn entity_type(&self) -> EntityType {
        EntityType::Class
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
        let batch = reader.required("batch");

        match (class_name, batch) {
            (Some(class_name), Some(batch)) => Ok(Record::Class(ClassRecord { class_name, batch })),
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
            match &row.record {
                Record::Class(class) => {
                    let id = Uuid::new_v4();
                    batch.push((row.row_number, id));
                    inserts.push(NewClass {
                        id,
                        class_name: class.class_name.clone(),
                        batch: class.batch.clone(),
                    });
                }
                _ => errors.push(mismatched_record(row, EntityType::Class)),
            }
        }

        match store.insert_classes(&inserts).await {
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
    use crate::ingest::types::ErrorCode;

    #[test]
    fn test_valid_class_row() {
        let record = ClassImporter
            .validate_row(&fields(&[("class_name", "CSE-A"), ("batch", "2024")]), 1)
            .unwrap();

        assert_eq!(
            record,
            Record::Class(ClassRecord {
                class_name: "CSE-A".to_string(),
                batch: "2024".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_batch() {
        let errors = ClassImporter
            .validate_row(&fields(&[("class_name", "CSE-A"), ("batch", "")]), 3)
            .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::RequiredField);
        assert_eq!(errors[0].column, "batch");
        assert_eq!(errors[0].row, 3);
    }
}
