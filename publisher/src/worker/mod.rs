pub mod announcer;
pub mod batching;
pub mod capacity;
pub mod controller;
pub mod monitor;
pub mod publisher;
pub mod schema;

use std::sync::Arc;

use controller::WorkerController;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::config::Config;
use crate::error::PublisherResult;

/// Starts every worker of the pipeline in the background and returns the controller
/// used to shut them down.
///
/// Open batches left by a previous run get their close timers back, the capacity gate
/// runs its first check, and the transaction monitor positions its cursor before
/// any job is consumed.
pub async fn initialize_worker(config: Arc<Config>) -> PublisherResult<WorkerController> {
    info!("Initializing workers");

    let mut controller = WorkerController::new(config, CancellationToken::new());
    controller.start().await?;

    info!("Workers initialized and started successfully");
    Ok(controller)
}
