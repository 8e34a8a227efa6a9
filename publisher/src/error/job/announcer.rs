use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use publisher_chain_client_interface::ModelType;
use thiserror::Error;

use crate::core::client::storage::StorageError;
use crate::error::job::schema::SchemaError;

#[derive(Error, Debug)]
pub enum AnnouncerError {
    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaError),

    #[error("Schema {schema_id} uses the {model_type:?} model, batches need Parquet")]
    UnsupportedModel { schema_id: u16, model_type: ModelType },

    #[error("Invalid parquet model of schema {schema_id}: {message}")]
    InvalidSchemaModel { schema_id: u16, message: String },

    #[error("Announcement has no value for column {column}")]
    MissingColumn { column: String },

    #[error("Column {column} expects {expected}")]
    TypeMismatch { column: String, expected: String },

    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    ParquetError(#[from] ParquetError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl AnnouncerError {
    /// Errors caused by the batch or its schema rather than by infrastructure
    pub fn is_permanent(&self) -> bool {
        match self {
            AnnouncerError::SchemaError(e) => e.is_missing(),
            AnnouncerError::UnsupportedModel { .. }
            | AnnouncerError::InvalidSchemaModel { .. }
            | AnnouncerError::MissingColumn { .. }
            | AnnouncerError::TypeMismatch { .. } => true,
            AnnouncerError::ArrowError(_) | AnnouncerError::ParquetError(_) | AnnouncerError::StorageError(_) => false,
        }
    }
}
