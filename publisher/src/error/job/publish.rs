use publisher_chain_client_interface::ChainClientError;
use thiserror::Error;

/// Outcome of a coalesced submission, shared by every caller that joined the batch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Another transaction took the nonce; try again later without spending an attempt
    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    #[error("Chain client error: {0}")]
    ChainClientError(ChainClientError),

    #[error("The batch had no jobs left to submit")]
    EmptyBatch,
}

impl PublishError {
    pub fn is_capacity_exhausted(&self) -> bool {
        match self {
            PublishError::ChainClientError(e) => e.is_capacity_exhausted(),
            PublishError::NonceConflict(_) | PublishError::EmptyBatch => false,
        }
    }
}

impl From<ChainClientError> for PublishError {
    fn from(error: ChainClientError) -> Self {
        match error {
            ChainClientError::NonceConflict(message) => PublishError::NonceConflict(message),
            other => PublishError::ChainClientError(other),
        }
    }
}
