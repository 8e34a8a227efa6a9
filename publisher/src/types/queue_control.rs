use lazy_static::lazy_static;
use std::collections::HashMap;
use std::time::Duration;

use crate::types::queue::QueueType;

#[derive(Clone, Debug)]
pub struct QueueControlConfig {
    /// Number of jobs processed in parallel by one worker pool
    pub concurrency: usize,
    /// Total attempts before a job lands in the failed set
    pub attempts: u32,
    /// Base delay of the exponential retry backoff
    pub backoff: Duration,
    /// Completed job ids kept around for deduplication
    pub retain_completed: usize,
}

impl QueueControlConfig {
    pub fn new(concurrency: usize, attempts: u32, backoff: Duration) -> Self {
        Self { concurrency, attempts, backoff, retain_completed: 1000 }
    }
}

impl Default for QueueControlConfig {
    fn default() -> Self {
        Self::new(2, 3, Duration::from_secs(1))
    }
}

lazy_static! {
    pub static ref QUEUES: HashMap<QueueType, QueueControlConfig> = {
        let mut map = HashMap::new();
        for queue in QueueType::ANNOUNCEMENT_QUEUES {
            map.insert(queue, QueueControlConfig::default());
        }
        map.insert(QueueType::BatchAnnouncement, QueueControlConfig::new(2, 3, Duration::from_secs(5)));
        map.insert(QueueType::Publish, QueueControlConfig::new(2, 3, Duration::from_secs(6)));
        map
    };
}

/// Control settings of `queue`, falling back to the defaults
pub fn queue_control(queue: QueueType) -> QueueControlConfig {
    QUEUES.get(&queue).cloned().unwrap_or_default()
}
