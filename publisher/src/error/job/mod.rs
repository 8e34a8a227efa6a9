pub mod announcer;
pub mod batching;
pub mod capacity;
pub mod publish;
pub mod schema;

use std::time::Duration;

use publisher_chain_client_interface::ChainClientError;
use thiserror::Error;

use crate::core::client::queue::QueueError;
use crate::core::client::storage::StorageError;
use crate::core::client::store::StoreError;
use announcer::AnnouncerError;
use batching::BatchingError;
use capacity::CapacityError;
use publish::PublishError;
use schema::SchemaError;

pub type JobResult<T> = Result<T, JobError>;

/// Error types of a job processed by one of the queue workers
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Queue error: {0}")]
    QueueError(#[from] QueueError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Chain client error: {0}")]
    ChainClientError(#[from] ChainClientError),

    #[error("Failed to serialize data: {0}")]
    FailedToSerializeData(#[from] serde_json::Error),

    #[error("Batching Error: {0}")]
    BatchingError(#[from] BatchingError),

    #[error("Announcer Error: {0}")]
    AnnouncerError(#[from] AnnouncerError),

    #[error("Publish Error: {0}")]
    PublishError(#[from] PublishError),

    #[error("Capacity Error: {0}")]
    CapacityError(#[from] CapacityError),

    #[error("Schema Error: {0}")]
    SchemaError(#[from] SchemaError),

    /// Not a failure: the job is rescheduled without spending an attempt
    #[error("Job delayed by {delay:?}: {reason}")]
    Delayed { delay: Duration, reason: String },

    #[error("Unrecoverable: {0}")]
    Unrecoverable(String),
}

/// What the worker does with a job whose processing returned an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    /// Fail the attempt, the queue retries with backoff while attempts remain
    Retry,
    /// Reschedule without counting the attempt
    Delay(Duration),
    /// Move to the failed set right away
    Fail,
}

impl JobError {
    pub fn disposition(&self) -> JobDisposition {
        match self {
            JobError::Delayed { delay, .. } => JobDisposition::Delay(*delay),
            JobError::Unrecoverable(_) | JobError::FailedToSerializeData(_) => JobDisposition::Fail,
            JobError::QueueError(QueueError::InvalidPayload { .. }) => JobDisposition::Fail,
            JobError::BatchingError(
                BatchingError::InvalidBatchState { .. }
                | BatchingError::AnnouncementTypeMismatch { .. }
                | BatchingError::NotABatchingQueue(_),
            ) => JobDisposition::Fail,
            JobError::BatchingError(BatchingError::SchemaError(e)) | JobError::SchemaError(e) if e.is_missing() => {
                JobDisposition::Fail
            }
            JobError::AnnouncerError(e) if e.is_permanent() => JobDisposition::Fail,
            _ => JobDisposition::Retry,
        }
    }
}
