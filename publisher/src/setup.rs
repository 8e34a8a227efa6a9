use tracing::info;

use crate::cli::SetupCmd;
use crate::config::MongoConfig;
use crate::core::client::queue::mongodb::MongoJobQueue;
use crate::core::client::store::mongodb::MongoStateStore;
use crate::error::PublisherResult;

/// setup - Prepare the MongoDB state store and job queue indexes
pub async fn setup(setup_cmd: &SetupCmd) -> PublisherResult<()> {
    let mongo = MongoConfig {
        connection_uri: setup_cmd.mongodb_uri.clone(),
        database_name: setup_cmd.mongodb_database_name.clone(),
    };
    info!(database = %mongo.database_name, "Setting up MongoDB indexes");

    let store = MongoStateStore::new(&mongo).await?;
    store.setup_indexes().await?;
    MongoJobQueue::new(&mongo).await?.setup_indexes().await?;

    info!("MongoDB setup completed");
    Ok(())
}
