use publisher_chain_client_interface::ChainClientError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Chain client error while fetching schema: {0}")]
    ChainClientError(#[from] ChainClientError),

    #[error("Schema {0} does not exist on chain")]
    NotFound(u16),

    #[error("No schema registered as {namespace}.{name}")]
    NameNotFound { namespace: String, name: String },
}

impl SchemaError {
    /// The schema is definitely missing, retrying will not help
    pub fn is_missing(&self) -> bool {
        matches!(self, SchemaError::NotFound(_) | SchemaError::NameNotFound { .. })
    }
}
