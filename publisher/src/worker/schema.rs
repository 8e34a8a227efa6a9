use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use publisher_chain_client_interface::SchemaInfo;
use tokio::time::Instant;
use tracing::debug;

use crate::core::config::Config;
use crate::error::job::schema::SchemaError;
use crate::types::announcement::AnnouncementType;

/// Namespace the announcement schemas are registered under
pub const DSNP_NAMESPACE: &str = "dsnp";

struct Cached<T> {
    value: T,
    expires_at: Instant,
}

/// Chain schema lookups cached for a short ttl
pub struct SchemaRegistry {
    config: Arc<Config>,
    ttl: Duration,
    schemas: Mutex<HashMap<u16, Cached<SchemaInfo>>>,
    schema_ids: Mutex<HashMap<AnnouncementType, Cached<u16>>>,
}

impl SchemaRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        let ttl = Duration::from_secs(config.settings().schema_cache_ttl_seconds);
        Self { config, ttl, schemas: Mutex::new(HashMap::new()), schema_ids: Mutex::new(HashMap::new()) }
    }

    pub async fn schema(&self, schema_id: u16) -> Result<SchemaInfo, SchemaError> {
        if let Some(schema) = cached(&self.schemas, &schema_id) {
            return Ok(schema);
        }

        let schema =
            self.config.chain_client().get_schema(schema_id).await?.ok_or(SchemaError::NotFound(schema_id))?;
        debug!(schema_id, model_type = ?schema.model_type, "Fetched schema from chain");
        store(&self.schemas, schema_id, schema.clone(), self.ttl);
        Ok(schema)
    }

    /// Id of the DSNP schema registered for `announcement_type`
    pub async fn schema_id_for(&self, announcement_type: AnnouncementType) -> Result<u16, SchemaError> {
        if let Some(id) = cached(&self.schema_ids, &announcement_type) {
            return Ok(id);
        }

        let name = announcement_type.schema_name();
        let schema_id = self
            .config
            .chain_client()
            .get_schema_id_by_name(DSNP_NAMESPACE, name)
            .await?
            .ok_or_else(|| SchemaError::NameNotFound { namespace: DSNP_NAMESPACE.to_string(), name: name.to_string() })?;
        debug!(schema_id, name, "Resolved schema id");
        store(&self.schema_ids, announcement_type, schema_id, self.ttl);
        Ok(schema_id)
    }
}

fn cached<K: Eq + std::hash::Hash, T: Clone>(cache: &Mutex<HashMap<K, Cached<T>>>, key: &K) -> Option<T> {
    let cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    cache.get(key).filter(|entry| entry.expires_at > Instant::now()).map(|entry| entry.value.clone())
}

fn store<K: Eq + std::hash::Hash, T>(cache: &Mutex<HashMap<K, Cached<T>>>, key: K, value: T, ttl: Duration) {
    let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    cache.insert(key, Cached { value, expires_at: Instant::now() + ttl });
}
