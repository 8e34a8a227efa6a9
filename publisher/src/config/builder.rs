//! Configuration builder that implements the hierarchy: CLI > ENV > Config File > Defaults

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::validation::Validate;
use super::{MongoConfig, PublisherConfig, PublisherConfigVersioned, StoreConfig};
use crate::cli::RunCmd;

#[derive(Default)]
pub struct ConfigBuilder {
    base_config: Option<PublisherConfig>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_file(mut self, path: &Path) -> Result<Self> {
        info!("Loading configuration from file: {}", path.display());
        let config = PublisherConfigVersioned::from_yaml_file(path)?.into_canonical();
        self.base_config = Some(config);
        Ok(self)
    }

    pub fn with_config(mut self, config: PublisherConfig) -> Self {
        self.base_config = Some(config);
        self
    }

    /// Apply CLI overrides (which clap already merged with their env vars) on top of the base config
    pub fn with_cli_overrides(mut self, run_cmd: &RunCmd) -> Result<Self> {
        let config = self
            .base_config
            .as_mut()
            .context("Cannot apply CLI overrides without a base config (use with_config_file first)")?;
        debug!("Applying CLI overrides to configuration");

        if let Some(provider_id) = run_cmd.provider_id {
            debug!("Overriding provider_id from CLI: {}", provider_id);
            config.provider_id = provider_id;
        }
        if let Some(gateway_url) = &run_cmd.chain_gateway_url {
            debug!("Overriding chain.gateway_url from CLI");
            config.chain.gateway_url = gateway_url.clone();
        }
        if let Some(block_time_ms) = run_cmd.block_time_ms {
            debug!("Overriding chain.block_time_ms from CLI: {}", block_time_ms);
            config.chain.block_time_ms = block_time_ms;
        }
        if let Some(api_url) = &run_cmd.ipfs_api_url {
            debug!("Overriding ipfs.api_url from CLI");
            config.ipfs.api_url = api_url.clone();
        }
        if let Some(connection_uri) = &run_cmd.mongodb_uri {
            debug!("Overriding store with the mongodb backend from CLI");
            let database_name = match &config.store {
                StoreConfig::Mongodb(mongo) => mongo.database_name.clone(),
                StoreConfig::Memory => run_cmd.mongodb_database_name.clone(),
            };
            config.store = StoreConfig::Mongodb(MongoConfig { connection_uri: connection_uri.clone(), database_name });
        }
        if let Some(interval) = run_cmd.batch_interval_seconds {
            debug!("Overriding batching.interval_seconds from CLI: {}", interval);
            config.batching.interval_seconds = interval;
        }
        if let Some(max_count) = run_cmd.batch_max_count {
            debug!("Overriding batching.max_count from CLI: {}", max_count);
            config.batching.max_count = max_count;
        }

        Ok(self)
    }

    /// Build and validate the final configuration
    pub fn build(self) -> Result<PublisherConfig> {
        let config = self.base_config.context("No configuration loaded")?;

        info!("Validating configuration");
        config.validate()?;

        info!("Configuration loaded and validated successfully");
        Ok(config)
    }
}

pub fn load_config_from_run_cmd(run_cmd: &RunCmd) -> Result<PublisherConfig> {
    ConfigBuilder::new().with_config_file(&run_cmd.config_file)?.with_cli_overrides(run_cmd)?.build()
}
