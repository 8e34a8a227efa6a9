use thiserror::Error;

/// Substring the chain uses when a capacity-paid extrinsic cannot cover its fees.
pub const CAPACITY_EXHAUSTED_MARKER: &str = "inability to pay some fees";

/// Returns true when a free-form error message reports fee/capacity exhaustion.
pub fn is_capacity_exhaustion_message(message: &str) -> bool {
    message.to_lowercase().contains(CAPACITY_EXHAUSTED_MARKER)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainClientError {
    /// The submitted extrinsic collided with another one signed with the same nonce
    #[error("Transaction nonce conflicts with a pending transaction: {0}")]
    NonceConflict(String),

    #[error("Inability to pay some fees: {0}")]
    InsufficientCapacity(String),

    #[error("Chain RPC request failed: {0}")]
    Rpc(String),

    #[error("Failed to decode chain response: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Chain client error: {0}")]
    Other(String),
}

impl ChainClientError {
    /// Whether the error means the provider ran out of capacity for the current epoch.
    ///
    /// The structured variant is checked first. Gateways that only forward the raw
    /// dispatch message are still recognised through the message text.
    pub fn is_capacity_exhausted(&self) -> bool {
        match self {
            ChainClientError::InsufficientCapacity(_) => true,
            ChainClientError::NonceConflict(_) => false,
            other => is_capacity_exhaustion_message(&other.to_string()),
        }
    }

    pub fn is_nonce_conflict(&self) -> bool {
        matches!(self, ChainClientError::NonceConflict(_))
    }
}
