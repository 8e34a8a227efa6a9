use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Network error during {operation}: {message}")]
    NetworkError { operation: &'static str, message: String },

    #[error("IPFS API error during {operation} (status {status}): {message}")]
    ApiError { operation: &'static str, status: StatusCode, message: String },

    #[error("Failed to parse response during {operation}: {message}")]
    ParseError { operation: &'static str, message: String },

    #[error("Failed to build URL for {operation}: {message}")]
    UrlError { operation: &'static str, message: String },
}

impl StorageError {
    pub fn from_reqwest_error(operation: &'static str, source: reqwest::Error) -> Self {
        if source.is_decode() {
            return StorageError::ParseError { operation, message: source.to_string() };
        }
        StorageError::NetworkError { operation, message: source.to_string() }
    }
}
