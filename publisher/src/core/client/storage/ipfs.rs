use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use super::{ContentStat, ContentStore, PinnedContent, StorageError};
use crate::config::types::ipfs::IpfsConfig;

/// multihash prefix of a 32 byte sha2-256 digest
const SHA2_256_MULTIHASH_PREFIX: &str = "1220";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
    size: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FilesStatResponse {
    hash: String,
    size: u64,
}

/// Hex encoded sha2-256 multihash of `data`
pub fn sha2_256_multihash(data: &[u8]) -> String {
    format!("{}{}", SHA2_256_MULTIHASH_PREFIX, hex::encode(Sha256::digest(data)))
}

/// [`ContentStore`] over the HTTP RPC API of an IPFS (kubo) node
pub struct IpfsContentStore {
    client: reqwest::Client,
    api_url: Url,
    basic_auth: Option<(String, String)>,
}

impl IpfsContentStore {
    pub fn new(config: &IpfsConfig) -> Self {
        let basic_auth = match (&config.basic_auth_user, &config.basic_auth_secret) {
            (Some(user), Some(secret)) => Some((user.clone(), secret.clone())),
            _ => None,
        };
        Self { client: reqwest::Client::new(), api_url: config.api_url.clone(), basic_auth }
    }

    fn endpoint(&self, operation: &'static str, command: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::UrlError { operation, message: format!("{} cannot be a base", self.api_url) })?
            .pop_if_empty()
            .extend(["api", "v0"])
            .extend(command);
        Ok(url)
    }

    /// The IPFS RPC API only accepts POST
    fn post(&self, url: Url) -> RequestBuilder {
        let request = self.client.post(url);
        match &self.basic_auth {
            Some((user, secret)) => request.basic_auth(user, Some(secret)),
            None => request,
        }
    }

    async fn send(operation: &'static str, request: RequestBuilder) -> Result<Response, StorageError> {
        let response = request.send().await.map_err(|e| StorageError::from_reqwest_error(operation, e))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::ApiError { operation, status, message });
        }
        Ok(response)
    }
}

#[async_trait]
impl ContentStore for IpfsContentStore {
    async fn pin(&self, mime_type: &str, data: Bytes) -> Result<PinnedContent, StorageError> {
        let operation = "pin";
        let mut url = self.endpoint(operation, &["add"])?;
        url.query_pairs_mut().append_pair("cid-version", "1").append_pair("pin", "true");

        let hash = sha2_256_multihash(&data);
        let part = Part::stream(data)
            .file_name("file")
            .mime_str(mime_type)
            .map_err(|e| StorageError::ParseError { operation, message: e.to_string() })?;
        let form = Form::new().part("file", part);

        let response = Self::send(operation, self.post(url).multipart(form)).await?;
        let added: AddResponse =
            response.json().await.map_err(|e| StorageError::ParseError { operation, message: e.to_string() })?;
        let size = added.size.parse().map_err(|e| StorageError::ParseError {
            operation,
            message: format!("invalid size {}: {}", added.size, e),
        })?;

        info!(cid = %added.hash, size, "Pinned content");
        Ok(PinnedContent { cid: added.hash, hash, size })
    }

    async fn get(&self, cid: &str) -> Result<Bytes, StorageError> {
        let operation = "get";
        let mut url = self.endpoint(operation, &["cat"])?;
        url.query_pairs_mut().append_pair("arg", cid);

        let response = Self::send(operation, self.post(url)).await?;
        response.bytes().await.map_err(|e| StorageError::from_reqwest_error(operation, e))
    }

    async fn stat(&self, cid: &str) -> Result<ContentStat, StorageError> {
        let operation = "stat";
        let mut url = self.endpoint(operation, &["files", "stat"])?;
        url.query_pairs_mut().append_pair("arg", &format!("/ipfs/{}", cid));

        let response = Self::send(operation, self.post(url)).await?;
        let stat: FilesStatResponse =
            response.json().await.map_err(|e| StorageError::ParseError { operation, message: e.to_string() })?;
        debug!(cid = %stat.hash, size = stat.size, "Fetched content stat");
        Ok(ContentStat { cid: stat.hash, size: stat.size })
    }
}
