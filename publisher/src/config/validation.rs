use anyhow::{ensure, Result};

use super::PublisherConfig;
use crate::types::capacity::{CapacityLimit, CapacityLimitType};

/// Semantic checks that serde can not express
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl Validate for CapacityLimit {
    fn validate(&self) -> Result<()> {
        if self.limit_type == CapacityLimitType::Percentage {
            ensure!(self.value <= 100, "Capacity percentage limit must be at most 100, got {}", self.value);
        }
        Ok(())
    }
}

impl Validate for PublisherConfig {
    fn validate(&self) -> Result<()> {
        ensure!(self.chain.block_time_ms > 0, "chain.block_time_ms must be greater than 0");
        ensure!(self.batching.interval_seconds > 0, "batching.interval_seconds must be greater than 0");
        ensure!(self.batching.max_count > 0, "batching.max_count must be greater than 0");
        ensure!(self.batching.lock_expire_seconds > 0, "batching.lock_expire_seconds must be greater than 0");
        ensure!(self.publishing.max_batch_size > 0, "publishing.max_batch_size must be greater than 0");
        ensure!(self.publishing.attempts > 0, "publishing.attempts must be greater than 0");
        ensure!(self.monitor.scan_interval_seconds > 0, "monitor.scan_interval_seconds must be greater than 0");
        ensure!(self.monitor.max_blocks_per_scan > 0, "monitor.max_blocks_per_scan must be greater than 0");

        for (queue, concurrency) in &self.queues.concurrency {
            ensure!(*concurrency > 0, "queues.concurrency.{} must be greater than 0", queue);
        }

        self.capacity.service_limit.validate()?;
        if let Some(total_limit) = &self.capacity.total_limit {
            total_limit.validate()?;
        }

        ensure!(
            self.queue_mongo().is_some(),
            "The job queue needs MongoDB: set queues.mongodb or use the mongodb store backend"
        );
        Ok(())
    }
}
