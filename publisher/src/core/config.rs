use std::sync::Arc;
use std::time::Duration;

use publisher_chain_client_interface::ChainClient;
use publisher_gateway_chain_client::GatewayChainClient;
use tracing::info;

use crate::config::{PublisherConfig, StoreConfig};
use crate::core::client::queue::mongodb::MongoJobQueue;
use crate::core::client::storage::ipfs::IpfsContentStore;
use crate::core::client::store::memory::InMemoryStateStore;
use crate::core::client::store::mongodb::MongoStateStore;
use crate::core::client::webhook::WebhookNotifier;
use crate::core::client::{ContentStore, JobQueue, Notifier, StateStore};
use crate::error::{PublisherError, PublisherResult};

/// Shared runtime state: settings plus every client the workers talk to
pub struct Config {
    settings: PublisherConfig,
    chain_client: Arc<dyn ChainClient>,
    store: Arc<dyn StateStore>,
    queue: Arc<dyn JobQueue>,
    content_store: Arc<dyn ContentStore>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Config {
    pub fn new(
        settings: PublisherConfig,
        chain_client: Arc<dyn ChainClient>,
        store: Arc<dyn StateStore>,
        queue: Arc<dyn JobQueue>,
        content_store: Arc<dyn ContentStore>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self { settings, chain_client, store, queue, content_store, notifier }
    }

    /// Builds the production clients described by `settings`
    pub async fn from_settings(settings: PublisherConfig) -> PublisherResult<Self> {
        let chain_client = GatewayChainClient::new(
            settings.chain.gateway_url.clone(),
            Duration::from_secs(settings.chain.request_timeout_seconds),
        )?;

        let store: Arc<dyn StateStore> = match &settings.store {
            StoreConfig::Memory => {
                info!("Using the in-memory state store");
                Arc::new(InMemoryStateStore::new())
            }
            StoreConfig::Mongodb(mongo) => {
                info!(database = %mongo.database_name, "Using the MongoDB state store");
                Arc::new(MongoStateStore::new(mongo).await?)
            }
        };

        let queue_mongo = settings.queue_mongo().ok_or_else(|| {
            PublisherError::ConfigError(anyhow::anyhow!(
                "The job queue needs MongoDB: set queues.mongodb or use the mongodb store backend"
            ))
        })?;
        info!(database = %queue_mongo.database_name, "Using the MongoDB job queue");
        let queue = Arc::new(MongoJobQueue::new(queue_mongo).await?);

        let notifier: Option<Arc<dyn Notifier>> = if settings.webhooks.urls.is_empty() {
            None
        } else {
            Some(Arc::new(WebhookNotifier::new(&settings.webhooks)?))
        };

        let content_store = Arc::new(IpfsContentStore::new(&settings.ipfs));

        Ok(Self::new(
            settings,
            Arc::new(chain_client),
            store,
            queue,
            content_store,
            notifier,
        ))
    }

    pub fn settings(&self) -> &PublisherConfig {
        &self.settings
    }

    pub fn provider_id(&self) -> u64 {
        self.settings.provider_id
    }

    pub fn block_time(&self) -> Duration {
        self.settings.block_time()
    }

    pub fn chain_client(&self) -> &dyn ChainClient {
        self.chain_client.as_ref()
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn queue(&self) -> &dyn JobQueue {
        self.queue.as_ref()
    }

    pub fn content_store(&self) -> &dyn ContentStore {
        self.content_store.as_ref()
    }

    pub fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        self.notifier.clone()
    }
}
