use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_scan_interval")]
    pub scan_interval_seconds: u64,

    #[serde(default = "default_max_blocks_per_scan")]
    pub max_blocks_per_scan: u32,

    /// Delay before the capacity recheck after a systemic chain error paused publishing
    #[serde(default = "default_pause_recheck")]
    pub pause_recheck_seconds: u64,
}

impl MonitorConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn pause_recheck(&self) -> Duration {
        Duration::from_secs(self.pause_recheck_seconds)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval_seconds: default_scan_interval(),
            max_blocks_per_scan: default_max_blocks_per_scan(),
            pause_recheck_seconds: default_pause_recheck(),
        }
    }
}

fn default_scan_interval() -> u64 {
    6
}
fn default_max_blocks_per_scan() -> u32 {
    100
}
fn default_pause_recheck() -> u64 {
    60
}
