use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Maximum age of an open batch
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,

    /// Row count that closes a batch right away
    #[serde(default = "default_max_count")]
    pub max_count: u64,

    #[serde(default = "default_lock_expire")]
    pub lock_expire_seconds: u64,

    /// Abandoned locks drained by one close before giving up
    #[serde(default = "default_max_lock_recoveries")]
    pub max_lock_recoveries: u32,
}

impl BatchingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn lock_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_expire_seconds as i64)
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            max_count: default_max_count(),
            lock_expire_seconds: default_lock_expire(),
            max_lock_recoveries: default_max_lock_recoveries(),
        }
    }
}

fn default_interval() -> u64 {
    12
}
fn default_max_count() -> u64 {
    1000
}
fn default_lock_expire() -> u64 {
    6
}
fn default_max_lock_recoveries() -> u32 {
    3
}
