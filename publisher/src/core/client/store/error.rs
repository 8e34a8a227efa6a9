use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Mongo error: {0}")]
    MongoError(#[from] mongodb::error::Error),

    #[error("Failed to serialize document: {0}")]
    FailedToSerializeDocument(#[from] mongodb::bson::ser::Error),

    #[error("Failed to deserialize document: {0}")]
    FailedToDeserializeDocument(#[from] mongodb::bson::de::Error),

    #[error("Concurrent updates of {key} did not settle after {attempts} attempts")]
    ContentionExhausted { key: String, attempts: u32 },

    #[error("Invalid value stored under {key}: {message}")]
    InvalidValue { key: String, message: String },
}
