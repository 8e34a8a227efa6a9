use publisher_chain_client_interface::ChainClientError;
use thiserror::Error;

use crate::core::client::queue::QueueError;
use crate::core::client::store::StoreError;

#[derive(Error, Debug)]
pub enum CapacityError {
    #[error("Chain client error: {0}")]
    ChainClientError(#[from] ChainClientError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Queue error: {0}")]
    QueueError(#[from] QueueError),
}
