use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Base url of the chain gateway
    pub gateway_url: Url,

    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_block_time_ms() -> u64 {
    6000
}
fn default_request_timeout() -> u64 {
    30
}
