use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::core::config::Config;
use crate::core::timer::TimerRegistry;
use crate::error::{PublisherError, PublisherResult};
use crate::types::queue::QueueType;
use crate::worker::announcer::{BatchAnnouncementProcessor, BatchAnnouncer};
use crate::worker::batching::{AnnouncementBatchingProcessor, BatchAccumulator};
use crate::worker::capacity::CapacityGate;
use crate::worker::controller::queue_worker::{JobProcessor, QueueWorker};
use crate::worker::monitor::TxStatusMonitor;
use crate::worker::publisher::{MessagePublisher, PublishingService};
use crate::worker::schema::SchemaRegistry;

/// Owns every background task of the pipeline
pub struct WorkerController {
    config: Arc<Config>,
    timers: TimerRegistry,
    cancellation_token: CancellationToken,
    tasks: JoinSet<()>,
}

impl WorkerController {
    pub fn new(config: Arc<Config>, cancellation_token: CancellationToken) -> Self {
        Self { config, timers: TimerRegistry::new(), cancellation_token, tasks: JoinSet::new() }
    }

    /// start - Recover state left by a previous run, then spawn the queue workers and the background loops
    pub async fn start(&mut self) -> PublisherResult<()> {
        let config = self.config.clone();
        let schemas = Arc::new(SchemaRegistry::new(config.clone()));

        let accumulator = BatchAccumulator::new(config.clone(), self.timers.clone(), schemas.clone());
        for queue in QueueType::ANNOUNCEMENT_QUEUES {
            accumulator
                .setup_active_batch_timeout(queue)
                .await
                .map_err(|e| PublisherError::WorkerError(format!("Failed to recover open batch of {}: {}", queue, e)))?;
            self.spawn_queue_worker(queue, Arc::new(AnnouncementBatchingProcessor::new(accumulator.clone())));
        }

        let announcer = BatchAnnouncer::new(config.clone(), schemas);
        self.spawn_queue_worker(
            QueueType::BatchAnnouncement,
            Arc::new(BatchAnnouncementProcessor::new(config.clone(), announcer)),
        );

        let (gate, receiver) = CapacityGate::new(config.clone(), self.timers.clone());
        let gate = Arc::new(gate);
        gate.check_for_sufficient_capacity().await?;
        let token = self.cancellation_token.child_token();
        self.tasks.spawn(gate.clone().run(receiver, token).instrument(info_span!("capacity", q = "capacityGate")));

        let publisher = Arc::new(MessagePublisher::new(config.clone()));
        self.spawn_queue_worker(
            QueueType::Publish,
            Arc::new(PublishingService::new(config.clone(), gate.clone(), publisher)),
        );

        let monitor = Arc::new(TxStatusMonitor::new(config, gate));
        monitor.initialize().await?;
        let token = self.cancellation_token.child_token();
        self.tasks.spawn(monitor.run(token).instrument(info_span!("monitor", q = "txMonitor")));

        info!(tasks = self.tasks.len(), "Workers started");
        Ok(())
    }

    fn spawn_queue_worker(&mut self, queue: QueueType, processor: Arc<dyn JobProcessor>) {
        let worker = QueueWorker::new(self.config.clone(), queue, processor, self.cancellation_token.child_token());
        self.tasks.spawn(worker.run().instrument(info_span!("worker", q = %queue)));
    }

    /// shutdown - Cancel every task and timer, then wait for in-flight jobs to settle
    pub async fn shutdown(mut self) -> PublisherResult<()> {
        info!("Shutting down workers");
        self.cancellation_token.cancel();
        self.timers.cancel_all();

        let mut failures = 0;
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task ended abnormally");
                failures += 1;
            }
        }

        if failures > 0 {
            return Err(PublisherError::WorkerError(format!("{} worker tasks ended abnormally", failures)));
        }
        info!("All workers stopped");
        Ok(())
    }
}
