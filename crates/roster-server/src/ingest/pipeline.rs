//! CSV ingestion pipeline
//!
//! Runs one import end to end:
//! 1. Check preconditions
//! 2. Parse and check headers
//! 3. Validate rows
//! 4. Drop in-file duplicates
//! 5. Resolve relations
//! 6. Drop rows already in the store
//! 7. Drop schedule overlaps
//! 8. Persist in batches, reporting progress after each one
//!
//! Gates 1 and 2 abort the import. Every later stage only removes rows.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::consistency::{find_in_file_duplicates, find_schedule_overlaps, find_store_duplicates};
use super::importers::EntityImporter;
use super::parser::parse_csv;
use super::password::PasswordHashError;
use super::resolver::{build_lookup_maps, resolve_rows};
use super::store::{RecordStore, StoreError};
use super::types::{ErrorCode, IngestionError, IngestionResult, ResolvedRow, RowView, ValidatedRow};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Receives the number of rows handled so far after each persisted batch
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, processed_rows: usize);
}

/// Reporter that discards progress
pub struct NoProgress;

#[async_trait]
impl ProgressReporter for NoProgress {
    async fn report(&self, _processed_rows: usize) {}
}

/// Infrastructure failure that stopped an import
///
/// Row-level problems never surface here; they are reported in
/// [`IngestionResult::errors`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Password hashing failed: {0}")]
    PasswordHash(#[from] PasswordHashError),
}

#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn RecordStore>,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Verify every scope the importer depends on holds at least one record
    pub async fn check_preconditions(
        &self,
        importer: &dyn EntityImporter,
    ) -> Result<Vec<IngestionError>, StoreError> {
        let mut errors = Vec::new();

        for scope in importer.preconditions() {
            if !self.store.has_records(*scope).await? {
                errors.push(IngestionError::new(
                    0,
                    "",
                    ErrorCode::PreconditionFailed,
                    format!(
                        "Import requires at least one {0} to exist. Please create {0} records first.",
                        scope
                    ),
                ));
            }
        }

        Ok(errors)
    }

    pub async fn ingest(
        &self,
        input: &str,
        importer: &dyn EntityImporter,
        progress: &dyn ProgressReporter,
    ) -> Result<IngestionResult, PipelineError> {
        let start_time = Instant::now();
        let entity_type = importer.entity_type();

        // Step 1: Preconditions
        let precondition_errors = self.check_preconditions(importer).await?;
        if !precondition_errors.is_empty() {
            info!(%entity_type, errors = precondition_errors.len(), "Import aborted on preconditions");
            return Ok(IngestionResult::aborted(precondition_errors));
        }

        // Step 2: Parse
        let parsed = parse_csv(input, importer.expected_headers());
        if !parsed.is_ok() {
            info!(%entity_type, errors = parsed.errors.len(), "Import aborted on CSV structure");
            return Ok(IngestionResult::aborted(parsed.errors));
        }

        let total_rows = parsed.rows.len();
        let mut errors = Vec::new();
        debug!(%entity_type, total_rows, "Parsed CSV");

        // Step 3: Validate
        let mut validated = Vec::with_capacity(total_rows);
        for row in parsed.rows {
            match importer.validate_row(&row.fields, row.row_number) {
                Ok(record) => validated.push(ValidatedRow {
                    row_number: row.row_number,
                    record,
                }),
                Err(row_errors) => errors.extend(row_errors),
            }
        }
        debug!(%entity_type, valid = validated.len(), errors = errors.len(), "Validated rows");

        // Step 4: In-file duplicates
        let unique = importer.unique_fields();
        if !unique.is_empty() {
            let duplicates = find_in_file_duplicates(&validated, unique);
            validated = drop_rows(validated, &duplicates);
            debug!(%entity_type, duplicates = duplicates.len(), "Checked in-file duplicates");
            errors.extend(duplicates);
        }

        // Step 5: Relations
        let relations = importer.relations();
        let mut rows: Vec<ResolvedRow> = if relations.is_empty() {
            validated.into_iter().map(ResolvedRow::unresolved).collect()
        } else {
            let maps = build_lookup_maps(self.store.as_ref(), &validated, relations).await?;
            let resolution = resolve_rows(validated, relations, &maps);
            debug!(
                %entity_type,
                resolved = resolution.rows.len(),
                unresolved = resolution.errors.len(),
                "Resolved relations"
            );
            errors.extend(resolution.errors);
            resolution.rows
        };

        // Step 6: Store duplicates
        if !unique.is_empty() {
            let duplicates = find_store_duplicates(self.store.as_ref(), &rows, unique).await?;
            rows = drop_rows(rows, &duplicates);
            debug!(%entity_type, duplicates = duplicates.len(), "Checked stored duplicates");
            errors.extend(duplicates);
        }

        // Step 7: Schedule overlaps
        if importer.checks_schedule_overlaps() {
            let overlaps = find_schedule_overlaps(&rows);
            rows = drop_rows(rows, &overlaps);
            debug!(%entity_type, overlaps = overlaps.len(), "Checked schedule overlaps");
            errors.extend(overlaps);
        }

        // Step 8: Persist
        let mut success_count = 0;
        let mut processed_rows = 0;
        for chunk in rows.chunks(self.batch_size) {
            let batch_errors = importer.persist(self.store.as_ref(), chunk).await?;
            let failed: HashSet<usize> = batch_errors.iter().map(|e| e.row).collect();

            success_count += chunk.len() - failed.len().min(chunk.len());
            processed_rows += chunk.len();
            errors.extend(batch_errors);

            debug!(%entity_type, processed_rows, success_count, "Persisted batch");
            progress.report(processed_rows).await;
        }

        info!(
            %entity_type,
            total_rows,
            success_count,
            errors = errors.len(),
            "Import finished in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );

        Ok(IngestionResult {
            total_rows,
            success_count,
            failure_count: total_rows - success_count,
            errors,
        })
    }
}

/// Keep only rows that received none of `errors`
fn drop_rows<R: RowView>(rows: Vec<R>, errors: &[IngestionError]) -> Vec<R> {
    if errors.is_empty() {
        return rows;
    }
    let failed: HashSet<usize> = errors.iter().map(|e| e.row).collect();
    rows.into_iter()
        .filter(|row| !failed.contains(&row.row_number()))
        .collect()
}
