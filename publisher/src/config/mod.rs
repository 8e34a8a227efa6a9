pub mod builder;
pub mod env_interpolation;
pub mod types;
pub mod validation;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use builder::{load_config_from_run_cmd, ConfigBuilder};
use env_interpolation::interpolate_yaml_content;
pub use types::*;

/// Versioned configuration wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "config_version")]
pub enum PublisherConfigVersioned {
    #[serde(rename = "1")]
    V1(PublisherConfigV1),
}

impl PublisherConfigVersioned {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml_str(&content)
    }

    /// Parses `content` after interpolating `${VAR}` references
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let content = interpolate_yaml_content(content)?;
        let yaml_value: serde_yaml::Value = serde_yaml::from_str(&content).context("Failed to parse YAML")?;

        if yaml_value.get("config_version").is_none() {
            anyhow::bail!(
                "Missing required field 'config_version' in config file. \
                 Current supported version: 1"
            );
        }

        serde_yaml::from_str(&content).context("Failed to deserialize config")
    }

    pub fn into_canonical(self) -> PublisherConfig {
        match self {
            PublisherConfigVersioned::V1(v1) => v1,
        }
    }
}

/// Canonical configuration (always latest version internally)
pub type PublisherConfig = PublisherConfigV1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfigV1 {
    /// MSA id of the provider paying for submissions with its capacity
    pub provider_id: u64,
    pub chain: ChainConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub ipfs: IpfsConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub capacity: CapacityLimits,
    #[serde(default)]
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub queues: QueuesConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default = "default_schema_cache_ttl")]
    pub schema_cache_ttl_seconds: u64,
}

impl PublisherConfigV1 {
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.chain.block_time_ms)
    }

    /// MongoDB database of the job queue: `queues.mongodb`, else the store database
    pub fn queue_mongo(&self) -> Option<&MongoConfig> {
        match (&self.queues.mongodb, &self.store) {
            (Some(mongo), _) => Some(mongo),
            (None, StoreConfig::Mongodb(mongo)) => Some(mongo),
            (None, StoreConfig::Memory) => None,
        }
    }
}

fn default_schema_cache_ttl() -> u64 {
    300
}
