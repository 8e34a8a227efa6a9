use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::store::MongoConfig;
use crate::types::queue::QueueType;
use crate::types::queue_control::queue_control;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueuesConfig {
    /// Worker concurrency per queue, overriding the queue control defaults
    #[serde(default)]
    pub concurrency: HashMap<QueueType, usize>,

    /// Database holding the jobs. Defaults to the store database when the store is on MongoDB.
    #[serde(default)]
    pub mongodb: Option<MongoConfig>,
}

impl QueuesConfig {
    pub fn concurrency_for(&self, queue: QueueType) -> usize {
        self.concurrency.get(&queue).copied().unwrap_or_else(|| queue_control(queue).concurrency)
    }
}
