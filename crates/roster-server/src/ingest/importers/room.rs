use async_trait::async_trait;
use roster_common::EntityType;
use std::collections::HashMap;
use uuid::Uuid;

use super::{mismatched_record, rejected_batch, skipped_rows, EntityImporter};
use crate::ingest::pipeline::PipelineError;
use crate::ingest::records::{Record, RoomRecord};
use crate::ingest::store::{NewRoom, RecordStore};
use crate::ingest::types::{IngestionError, KeyField, ResolvedRow, Scope, UniqueField};
use crate::ingest::validator::RowReader;

const HEADERS: &[&str] = &["room_number", "building_name", "floor_number"];

const UNIQUE: &[UniqueField] = &[UniqueField {
    field: KeyField::RoomNumber,
    scope: Scope::Rooms,
}];

pub struct RoomImporter;

#[async_trait]
impl EntityImporter for RoomImporter {
    fn entity_type(&self) -> EntityType {
        EntityType::Room
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
        let room_number = reader.required("room_number");
        let building_name = reader.required("building_name");
        let floor_number = reader.integer("floor_number");

        match (room_number, building_name, floor_number) {
            (Some(room_number), Some(building_name), Some(floor_number)) => {
                Ok(Record::Room(RoomRecord {
                    room_number,
                    building_name,
                    floor_number,
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
        let mut batch = Vec::with_capacity(rows.len());
        let mut inserts = Vec::with_capacity(rows.len());

        for row in rows {
            let Record::Room(room) = &row.record else {
                errors.push(mismatched_record(row, EntityType::Room));
                continue;
            };
            let id = Uuid::new_v4();
            batch.push((row.row_number, id));
            inserts.push(NewRoom {
                id,
                room_number: room.room_number.clone(),
                building_name: room.building_name.clone(),
                floor_number: room.floor_number,
            });
        }

        match store.insert_rooms(&inserts).await {
            Ok(skipped) => errors.extend(skipped_rows(&batch, &skipped, KeyField::RoomNumber, Scope::Rooms)),
            Err(err) => {
                let numbers: Vec<usize> = batch.iter().map(|(row, _)| *row).collect();
                errors.extend(rejected_batch(&numbers, err)?);
            }
        }

        Ok(errors)
    }
}
