use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use publisher_chain_client_interface::{is_capacity_exhaustion_message, CapacityInfo};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config::Config;
use crate::core::timer::TimerRegistry;
use crate::error::job::capacity::CapacityError;
use crate::types::queue::QueueType;

pub const CAPACITY_EPOCH_TIMEOUT: &str = "CAPACITY_EPOCH_TIMEOUT";

/// Events that make the gate re-evaluate the provider's capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacitySignal {
    /// A submission failed because fees could not be paid
    Exhausted,
    /// Stake of the provider changed on chain
    StakeChanged,
    /// The epoch timer fired
    EpochRollover,
    /// Publishing was paused after a systemic chain error, check again after the delay
    RecheckAfter(Duration),
}

/// Admission control of the publish queue against the provider's per-epoch capacity
pub struct CapacityGate {
    config: Arc<Config>,
    timers: TimerRegistry,
    signals: UnboundedSender<CapacitySignal>,
    exhausted: AtomicBool,
}

impl CapacityGate {
    pub fn new(config: Arc<Config>, timers: TimerRegistry) -> (Self, UnboundedReceiver<CapacitySignal>) {
        let (signals, receiver) = mpsc::unbounded_channel();
        (Self { config, timers, signals, exhausted: AtomicBool::new(false) }, receiver)
    }

    pub fn signal(&self, signal: CapacitySignal) {
        if self.signals.send(signal).is_err() {
            debug!(?signal, "Capacity gate is no longer listening");
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    /// check_for_sufficient_capacity - Compare remaining capacity and configured limits, then pause or resume publishing
    pub async fn check_for_sufficient_capacity(&self) -> Result<bool, CapacityError> {
        let info = self.config.chain_client().capacity_info(self.config.provider_id()).await?;

        let out_of_capacity = if info.remaining_capacity == 0 {
            warn!(provider_id = info.provider_id, "No capacity left");
            true
        } else {
            self.limit_reached(&info).await?
        };

        if out_of_capacity {
            self.on_exhausted(&info).await?;
        } else {
            self.on_available().await?;
        }
        Ok(!out_of_capacity)
    }

    async fn limit_reached(&self, info: &CapacityInfo) -> Result<bool, CapacityError> {
        let limits = &self.config.settings().capacity;

        let service_limit = limits.service_limit.resolve(info.total_capacity_issued);
        let used = self.config.store().get_epoch_usage(info.current_epoch).await?;
        if used >= service_limit {
            warn!(epoch = info.current_epoch, used = %used, limit = %service_limit, "Service capacity limit reached");
            return Ok(true);
        }
        debug!(epoch = info.current_epoch, used = %used, limit = %service_limit, "Service capacity usage");

        if let Some(total_limit) = &limits.total_limit {
            let limit = total_limit.resolve(info.total_capacity_issued);
            let total_used = info.total_capacity_issued.saturating_sub(info.remaining_capacity);
            if total_used >= limit {
                warn!(
                    used = %total_used,
                    limit = %limit,
                    issued = %info.total_capacity_issued,
                    "Total capacity limit reached"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn on_exhausted(&self, info: &CapacityInfo) -> Result<(), CapacityError> {
        self.config.queue().pause(QueueType::Publish).await?;

        let blocks = info.next_epoch_start.saturating_sub(info.current_block_number).max(1);
        let delay = self.config.block_time() * blocks;
        self.schedule_recheck(delay, CapacitySignal::EpochRollover);

        if !self.exhausted.swap(true, Ordering::SeqCst) {
            info!(
                next_epoch_start = info.next_epoch_start,
                blocks_remaining = blocks,
                "Capacity exhausted, publishing paused until the next epoch"
            );
        }
        Ok(())
    }

    async fn on_available(&self) -> Result<(), CapacityError> {
        let queue = self.config.queue();
        queue.resume(QueueType::Publish).await?;
        self.timers.cancel(CAPACITY_EPOCH_TIMEOUT);

        if self.exhausted.swap(false, Ordering::SeqCst) {
            info!("Capacity available, publishing resumed");
        }

        for job in queue.list_failed(QueueType::Publish).await? {
            let failed_on_capacity = job.failed_reason.as_deref().is_some_and(is_capacity_exhaustion_message);
            if failed_on_capacity && queue.retry_failed(QueueType::Publish, &job.id).await? {
                info!(job_id = %job.id, "Retrying job that failed on capacity");
            }
        }
        Ok(())
    }

    fn schedule_recheck(&self, delay: Duration, signal: CapacitySignal) {
        let signals = self.signals.clone();
        self.timers.schedule(CAPACITY_EPOCH_TIMEOUT, delay, async move {
            if signals.send(signal).is_err() {
                debug!(?signal, "Capacity gate is no longer listening");
            }
        });
    }

    pub async fn handle_signal(&self, signal: CapacitySignal) -> Result<(), CapacityError> {
        debug!(?signal, "Capacity signal");
        match signal {
            CapacitySignal::Exhausted => {
                let info = self.config.chain_client().capacity_info(self.config.provider_id()).await?;
                self.on_exhausted(&info).await
            }
            CapacitySignal::RecheckAfter(delay) => {
                self.config.queue().pause(QueueType::Publish).await?;
                self.schedule_recheck(delay, CapacitySignal::EpochRollover);
                Ok(())
            }
            CapacitySignal::StakeChanged | CapacitySignal::EpochRollover => {
                self.check_for_sufficient_capacity().await.map(|_| ())
            }
        }
    }

    /// Consumes capacity signals until cancelled
    pub async fn run(self: Arc<Self>, mut receiver: UnboundedReceiver<CapacitySignal>, cancellation_token: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => break,

                signal = receiver.recv() => {
                    let Some(signal) = signal else { break };
                    if let Err(e) = self.handle_signal(signal).await {
                        error!(?signal, error = %e, "Failed to handle capacity signal");
                    }
                }
            }
        }
        debug!("Capacity gate stopped");
    }
}
