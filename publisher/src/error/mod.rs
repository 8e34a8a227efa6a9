pub mod job;
pub mod monitor;

use thiserror::Error;

use crate::core::client::queue::QueueError;
use crate::core::client::storage::StorageError;
use crate::core::client::store::StoreError;
use crate::core::client::webhook::WebhookError;
use crate::error::job::capacity::CapacityError;
pub use monitor::MonitorError;
use publisher_chain_client_interface::ChainClientError;

/// Result type for publisher operations
pub type PublisherResult<T> = Result<T, PublisherError>;

/// Error types of the publisher process
#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] anyhow::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Queue error: {0}")]
    QueueError(#[from] QueueError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Chain client error: {0}")]
    ChainClientError(#[from] ChainClientError),

    #[error("Webhook error: {0}")]
    WebhookError(#[from] WebhookError),

    #[error("Capacity error: {0}")]
    CapacityError(#[from] CapacityError),

    #[error("Monitor error: {0}")]
    MonitorError(#[from] MonitorError),

    /// A worker task ended abnormally
    #[error("Worker error: {0}")]
    WorkerError(String),

    #[error("Setup Command Error: {0}")]
    SetupCommandError(String),
}
