pub mod error;
pub mod ipfs;

use async_trait::async_trait;
use bytes::Bytes;
pub use error::StorageError;
use serde::{Deserialize, Serialize};

/// Mime type batch files are pinned with
pub const BATCH_FILE_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedContent {
    pub cid: String,
    /// Hex encoded sha2-256 multihash of the content
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStat {
    pub cid: String,
    pub size: u64,
}

/// Content addressed storage for batch files
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store and pin `data`, returning its content identifier
    async fn pin(&self, mime_type: &str, data: Bytes) -> Result<PinnedContent, StorageError>;
    async fn get(&self, cid: &str) -> Result<Bytes, StorageError>;
    /// Size of already pinned content
    async fn stat(&self, cid: &str) -> Result<ContentStat, StorageError>;
}
