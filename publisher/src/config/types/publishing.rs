use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Jobs that force an immediate submission instead of waiting one block
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self { max_batch_size: default_max_batch_size(), attempts: default_attempts() }
    }
}

fn default_max_batch_size() -> usize {
    10
}
fn default_attempts() -> u32 {
    3
}
