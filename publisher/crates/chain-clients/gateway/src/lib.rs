//! [`ChainClient`] backed by the HTTP API of a chain gateway.
//!
//! The gateway owns the signing keys and the node connection; this client only
//! speaks JSON to it.

use std::time::Duration;

use async_trait::async_trait;
use publisher_chain_client_interface::{
    CapacityInfo, ChainCall, ChainClient, ChainClientError, FinalizedBlock, SchemaInfo, SubmittedTx,
};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

const NONCE_CONFLICT_CODE: &str = "NONCE_CONFLICT";
const INSUFFICIENT_CAPACITY_CODE: &str = "INSUFFICIENT_CAPACITY";

#[derive(Debug, Serialize)]
struct SubmitBatchRequest<'a> {
    calls: &'a [ChainCall],
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    code: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BlockNumberResponse {
    number: u32,
}

#[derive(Debug, Deserialize)]
struct EpochLengthResponse {
    length: u32,
}

#[derive(Debug, Deserialize)]
struct DelegationResponse {
    valid: bool,
}

#[derive(Debug, Deserialize)]
struct SchemaIdResponse {
    id: u16,
}

pub struct GatewayChainClient {
    client: reqwest::Client,
    base_url: Url,
}

impl GatewayChainClient {
    pub fn new(base_url: Url, request_timeout: Duration) -> Result<Self, ChainClientError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChainClientError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ChainClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ChainClientError::Other(format!("Gateway URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET `url` and decode the body. A 404 maps to `None`.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, ChainClientError> {
        debug!(url = %url, "Querying chain gateway");
        let response = self.client.get(url).send().await.map_err(|e| ChainClientError::Rpc(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        response.json::<T>().await.map(Some).map_err(|e| ChainClientError::Decode(e.to_string()))
    }

    async fn get_required<T: DeserializeOwned>(&self, url: Url) -> Result<T, ChainClientError> {
        let path = url.path().to_string();
        self.get_json(url).await?.ok_or(ChainClientError::NotFound(path))
    }
}

async fn error_from_response(response: Response) -> ChainClientError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return ChainClientError::Rpc(format!("{}: unreadable body: {}", status, e)),
    };
    let Ok(error) = serde_json::from_str::<GatewayErrorBody>(&body) else {
        return ChainClientError::Rpc(format!("{}: {}", status, body));
    };
    match error.code.as_deref() {
        Some(NONCE_CONFLICT_CODE) => ChainClientError::NonceConflict(error.message),
        Some(INSUFFICIENT_CAPACITY_CODE) => ChainClientError::InsufficientCapacity(error.message),
        _ => ChainClientError::Rpc(format!("{}: {}", status, error.message)),
    }
}

#[async_trait]
impl ChainClient for GatewayChainClient {
    async fn submit_with_capacity(&self, calls: Vec<ChainCall>) -> Result<SubmittedTx, ChainClientError> {
        let url = self.endpoint(&["v1", "extrinsics", "capacity-batch"])?;
        let response = self
            .client
            .post(url)
            .json(&SubmitBatchRequest { calls: &calls })
            .send()
            .await
            .map_err(|e| ChainClientError::Rpc(e.to_string()))?;

        if !response.status().is_success() {
            let error = error_from_response(response).await;
            warn!(error = %error, calls = calls.len(), "Gateway rejected capacity batch");
            return Err(error);
        }
        response.json::<SubmittedTx>().await.map_err(|e| ChainClientError::Decode(e.to_string()))
    }

    async fn capacity_info(&self, provider_id: u64) -> Result<CapacityInfo, ChainClientError> {
        let url = self.endpoint(&["v1", "capacity", &provider_id.to_string()])?;
        self.get_required(url).await
    }

    async fn latest_finalized_block_number(&self) -> Result<u32, ChainClientError> {
        let url = self.endpoint(&["v1", "blocks", "finalized"])?;
        Ok(self.get_required::<BlockNumberResponse>(url).await?.number)
    }

    async fn finalized_block(&self, number: u32) -> Result<Option<FinalizedBlock>, ChainClientError> {
        let url = self.endpoint(&["v1", "blocks", &number.to_string()])?;
        self.get_json(url).await
    }

    async fn epoch_length(&self) -> Result<u32, ChainClientError> {
        let url = self.endpoint(&["v1", "capacity", "epoch-length"])?;
        Ok(self.get_required::<EpochLengthResponse>(url).await?.length)
    }

    async fn check_delegation(
        &self,
        delegator_id: u64,
        schema_id: u16,
        provider_id: u64,
    ) -> Result<bool, ChainClientError> {
        let mut url = self.endpoint(&["v1", "delegations", &delegator_id.to_string(), &provider_id.to_string()])?;
        url.query_pairs_mut().append_pair("schemaId", &schema_id.to_string());
        // no delegation record at all is an invalid delegation
        Ok(self.get_json::<DelegationResponse>(url).await?.is_some_and(|delegation| delegation.valid))
    }

    async fn get_schema(&self, schema_id: u16) -> Result<Option<SchemaInfo>, ChainClientError> {
        let url = self.endpoint(&["v1", "schemas", &schema_id.to_string()])?;
        self.get_json(url).await
    }

    async fn get_schema_id_by_name(&self, namespace: &str, name: &str) -> Result<Option<u16>, ChainClientError> {
        let url = self.endpoint(&["v1", "schemas", "by-name", namespace, name])?;
        Ok(self.get_json::<SchemaIdResponse>(url).await?.map(|schema| schema.id))
    }
}
