pub mod error;
pub mod types;

use async_trait::async_trait;
use mockall::automock;
use mockall::predicate::*;

pub use error::{is_capacity_exhaustion_message, ChainClientError, CAPACITY_EXHAUSTED_MARKER};
pub use types::*;

/// Trait for every chain client used by the publisher.
/// It covers submission of capacity paid batches, capacity/epoch queries and
/// scanning of finalized blocks.
#[automock]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submit `calls` as one atomic batch paid with the provider's capacity
    async fn submit_with_capacity(&self, calls: Vec<ChainCall>) -> Result<SubmittedTx, ChainClientError>;
    /// Capacity snapshot for `provider_id` at the current block
    async fn capacity_info(&self, provider_id: u64) -> Result<CapacityInfo, ChainClientError>;
    async fn latest_finalized_block_number(&self) -> Result<u32, ChainClientError>;
    /// Returns `None` while `number` is not finalized yet
    async fn finalized_block(&self, number: u32) -> Result<Option<FinalizedBlock>, ChainClientError>;
    /// Length of a capacity epoch, in blocks
    async fn epoch_length(&self) -> Result<u32, ChainClientError>;
    async fn check_delegation(
        &self,
        delegator_id: u64,
        schema_id: u16,
        provider_id: u64,
    ) -> Result<bool, ChainClientError>;
    async fn get_schema(&self, schema_id: u16) -> Result<Option<SchemaInfo>, ChainClientError>;
    async fn get_schema_id_by_name(&self, namespace: &str, name: &str) -> Result<Option<u16>, ChainClientError>;
}
