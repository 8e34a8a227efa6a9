pub mod error;

use std::time::Duration;

use async_trait::async_trait;
pub use error::WebhookError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::types::webhooks::WebhooksConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    Succeeded,
    Failed,
}

/// Body POSTed to every configured webhook once a transaction is reconciled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxNotification {
    /// Id of the publish job the transaction carried
    pub reference_id: String,
    pub tx_hash: String,
    pub block_number: u32,
    pub schema_id: u16,
    pub status: TxStatus,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &TxNotification) -> Result<(), WebhookError>;
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    urls: Vec<Url>,
    max_retries: u32,
    retry_delay: Duration,
}

impl WebhookNotifier {
    pub fn new(config: &WebhooksConfig) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WebhookError::ClientError(e.to_string()))?;
        Ok(Self {
            client,
            urls: config.urls.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    async fn deliver(&self, url: &Url, notification: &TxNotification) -> Result<(), WebhookError> {
        let attempts = self.max_retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.client.post(url.clone()).json(notification).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(url = %url, tx_hash = %notification.tx_hash, attempt, "Webhook delivered");
                    return Ok(());
                }
                Ok(response) => last_error = format!("status {}", response.status()),
                Err(e) => last_error = e.to_string(),
            }
            warn!(url = %url, attempt, error = %last_error, "Webhook delivery failed");
            if attempt < attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        Err(WebhookError::DeliveryFailed { url: url.to_string(), attempts, message: last_error })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    /// Delivers to every url. Returns the first failure once all urls were tried.
    async fn notify(&self, notification: &TxNotification) -> Result<(), WebhookError> {
        let mut first_error = None;
        for url in &self.urls {
            if let Err(e) = self.deliver(url, notification).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
