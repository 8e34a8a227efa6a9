use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Webhook {url} failed after {attempts} attempts: {message}")]
    DeliveryFailed { url: String, attempts: u32, message: String },

    #[error("Failed to build webhook client: {0}")]
    ClientError(String),
}
