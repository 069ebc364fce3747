//! Bulk CSV ingestion
//!
//! Turns an uploaded CSV into stored records for one entity type, reporting
//! every rejected row with its column, error code and message.

pub mod consistency;
pub mod importers;
pub mod parser;
pub mod password;
pub mod pipeline;
pub mod records;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod types;
pub mod validator;

pub use importers::EntityImporter;
pub use password::PasswordHasher;
pub use pipeline::{IngestionPipeline, NoProgress, PipelineError, ProgressReporter};
pub use registry::ImporterRegistry;
pub use store::{MemoryRecordStore, PgRecordStore, RecordStore, StoreError};
pub use types::{ErrorCode, IngestionError, IngestionResult};
