use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpfsConfig {
    /// Url of the IPFS RPC API, e.g. `http://127.0.0.1:5001`
    pub api_url: Url,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth_user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth_secret: Option<String>,
}
