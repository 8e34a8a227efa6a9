use thiserror::Error;
use uuid::Uuid;

use crate::core::client::queue::QueueError;
use crate::core::client::store::StoreError;
use crate::error::job::schema::SchemaError;
use crate::types::announcement::AnnouncementType;
use crate::types::queue::QueueType;

#[derive(Error, Debug)]
pub enum BatchingError {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Queue error: {0}")]
    QueueError(#[from] QueueError),

    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaError),

    #[error("Batch state of {queue} is inconsistent, job {job_id} was not appended")]
    InvalidBatchState { queue: QueueType, job_id: String },

    #[error("Abandoned lock of {queue} (batch {batch_id}) still present after {attempts} recoveries")]
    AbandonedLockNotCleared { queue: QueueType, batch_id: Uuid, attempts: u32 },

    #[error("{queue} does not accept {announcement_type} announcements")]
    AnnouncementTypeMismatch { queue: QueueType, announcement_type: AnnouncementType },

    #[error("{0} is not a batching queue")]
    NotABatchingQueue(QueueType),
}
