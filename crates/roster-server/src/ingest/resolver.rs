//! Batched relation resolution
//!
//! Distinct values of each relation column are looked up with one store
//! query per column. Rows are then resolved against those maps without
//! further I/O. Multi-valued cells use `|` as separator and resolve part by
//! part; one missing part rejects the row.

use std::collections::{BTreeSet, HashMap};

use super::store::{RecordStore, StoreError};
use super::types::{
    ErrorCode, IngestionError, KeyField, Relation, ResolvedRow, ValidatedRow,
};

const MULTI_VALUE_SEPARATOR: char = '|';

/// Resolved identifiers per relation column, keyed by textual value
pub type LookupMaps = HashMap<KeyField, HashMap<String, String>>;

#[derive(Debug, Default)]
pub struct Resolution {
    pub rows: Vec<ResolvedRow>,
    pub errors: Vec<IngestionError>,
}

fn parts(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(MULTI_VALUE_SEPARATOR)
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

pub async fn build_lookup_maps(
    store: &dyn RecordStore,
    rows: &[ValidatedRow],
    relations: &[Relation],
) -> Result<LookupMaps, StoreError> {
    let mut maps = LookupMaps::new();

    for relation in relations {
        let values: BTreeSet<String> = rows
            .iter()
            .filter_map(|row| row.record.field(relation.column))
            .flat_map(parts)
            .map(str::to_string)
            .collect();

        let found = if values.is_empty() {
            HashMap::new()
        } else {
            let values: Vec<String> = values.into_iter().collect();
            store
                .lookup_ids(relation.target, relation.lookup, &values)
                .await?
        };

        tracing::debug!(
            column = %relation.column,
            target = %relation.target,
            resolved = found.len(),
            "Built relation lookup map"
        );
        maps.insert(relation.column, found);
    }

    Ok(maps)
}

pub fn resolve_rows(
    rows: Vec<ValidatedRow>,
    relations: &[Relation],
    maps: &LookupMaps,
) -> Resolution {
    let empty = HashMap::new();
    let mut resolution = Resolution::default();

    for row in rows {
        let mut references = HashMap::new();
        let mut row_errors = Vec::new();

        for relation in relations {
            let Some(value) = row.record.field(relation.column) else {
                continue;
            };
            let map = maps.get(&relation.column).unwrap_or(&empty);

            let mut ids = Vec::new();
            for part in parts(value) {
                match map.get(part) {
                    Some(id) => ids.push(id.as_str()),
                    None => row_errors.push(IngestionError::new(
                        row.row_number,
                        relation.column.as_str(),
                        ErrorCode::RelationNotFound,
                        format!(
                            "Referenced {} '{}' (matched by {}) does not exist",
                            relation.target, part, relation.lookup
                        ),
                    )),
                }
            }
            references.insert(relation.column, ids.join("|"));
        }

        if row_errors.is_empty() {
            resolution.rows.push(ResolvedRow {
                row_number: row.row_number,
                record: row.record,
                references,
            });
        } else {
            resolution.errors.extend(row_errors);
        }
    }

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::records::{ClassRecord, Record, StudentRecord, EnrollmentStatus};
    use crate::ingest::types::Scope;

    const CLASS_RELATION: &[Relation] = &[Relation {
        column: KeyField::ClassName,
        target: Scope::Classes,
        lookup: KeyField::ClassName,
    }];

    fn student_in(row_number: usize, class_name: &str) -> ValidatedRow {
        ValidatedRow {
            row_number,
            record: Record::Student(StudentRecord {
                registration_number: format!("S-{}", row_number),
                name: "Student".to_string(),
                email: format!("s{}@school.edu", row_number),
                password: "secret1".to_string(),
                class_name: class_name.to_string(),
                enrollment_status: EnrollmentStatus::Pending,
            }),
        }
    }

    fn maps(entries: &[(&str, &str)]) -> LookupMaps {
        let mut maps = LookupMaps::new();
        maps.insert(
            KeyField::ClassName,
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        maps
    }

    #[test]
    fn test_resolves_scalar_reference() {
        let resolution = resolve_rows(
            vec![student_in(1, "CSE-A")],
            CLASS_RELATION,
            &maps(&[("CSE-A", "id-a")]),
        );

        assert!(resolution.errors.is_empty());
        assert_eq!(resolution.rows[0].reference(KeyField::ClassName), Some("id-a"));
        // the validated record keeps its original text
        assert_eq!(resolution.rows[0].record.field(KeyField::ClassName), Some("CSE-A"));
    }

    #[test]
    fn test_multi_value_reports_only_missing_part() {
        let resolution = resolve_rows(
            vec![student_in(3, "CS101|MA201")],
            CLASS_RELATION,
            &maps(&[("CS101", "id-cs")]),
        );

        assert!(resolution.rows.is_empty());
        assert_eq!(resolution.errors.len(), 1);
        let error = &resolution.errors[0];
        assert_eq!(error.code, ErrorCode::RelationNotFound);
        assert_eq!(error.row, 3);
        assert!(error.message.contains("'MA201'"));
        assert!(!error.message.contains("CS101"));
    }

    #[test]
    fn test_multi_value_joins_resolved_ids() {
        let resolution = resolve_rows(
            vec![student_in(1, "CS101 | MA201")],
            CLASS_RELATION,
            &maps(&[("CS101", "id-cs"), ("MA201", "id-ma")]),
        );

        assert_eq!(resolution.rows[0].reference(KeyField::ClassName), Some("id-cs|id-ma"));
    }

    #[test]
    fn test_records_without_relation_column_pass_through() {
        let row = ValidatedRow {
            row_number: 1,
            record: Record::Class(ClassRecord {
                class_name: "CSE-A".to_string(),
                batch: "2024".to_string(),
            }),
        };
        let relation = &[Relation {
            column: KeyField::TeacherId,
            target: Scope::Teachers,
            lookup: KeyField::TeacherId,
        }];

        let resolution = resolve_rows(vec![row], relation, &LookupMaps::new());
        assert_eq!(resolution.rows.len(), 1);
        assert!(resolution.rows[0].references.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_maps_query_distinct_values() {
        use crate::ingest::store::{MemoryRecordStore, NewClass, RecordStore};
        use uuid::Uuid;

        let store = MemoryRecordStore::new();
        let id = Uuid::new_v4();
        store
            .insert_classes(&[NewClass {
                id,
                class_name: "CSE-A".to_string(),
                batch: "2024".to_string(),
            }])
            .await
            .unwrap();

        let rows = vec![student_in(1, "CSE-A"), student_in(2, "CSE-A"), student_in(3, "CSE-Z")];
        let maps = build_lookup_maps(&store, &rows, CLASS_RELATION).await.unwrap();

        let classes = &maps[&KeyField::ClassName];
        assert_eq!(classes.len(), 1);
        assert_eq!(classes.get("CSE-A"), Some(&id.to_string()));
    }
}
