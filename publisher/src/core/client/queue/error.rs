use thiserror::Error;

use crate::types::queue::QueueType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job {job_id} not found in {queue}")]
    JobNotFound { queue: QueueType, job_id: String },

    #[error("Failed to decode payload of job {job_id}: {message}")]
    InvalidPayload { job_id: String, message: String },

    #[error("Failed to encode job payload: {0}")]
    EncodeError(String),

    #[error("Queue backend error: {0}")]
    BackendError(String),
}

impl From<mongodb::error::Error> for QueueError {
    fn from(error: mongodb::error::Error) -> Self {
        QueueError::BackendError(error.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for QueueError {
    fn from(error: mongodb::bson::ser::Error) -> Self {
        QueueError::BackendError(format!("Failed to serialize job document: {}", error))
    }
}

impl From<mongodb::bson::de::Error> for QueueError {
    fn from(error: mongodb::bson::de::Error) -> Self {
        QueueError::BackendError(format!("Failed to deserialize job document: {}", error))
    }
}
