pub mod classification;

use std::collections::BTreeMap;
use std::sync::Arc;

use publisher_chain_client_interface::{ChainEvent, DispatchError, FinalizedBlock, TxHash};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::core::client::queue::{enqueue_json, EnqueueOptions};
use crate::core::client::webhook::{TxNotification, TxStatus};
use crate::core::config::Config;
use crate::error::MonitorError;
use crate::types::jobs::PublisherJob;
use crate::types::queue::QueueType;
use crate::types::transaction::PendingTransaction;
use crate::worker::capacity::{CapacityGate, CapacitySignal};
use classification::{classify, FailureAction};

/// Reconciles submitted transactions against finalized blocks
pub struct TxStatusMonitor {
    config: Arc<Config>,
    gate: Arc<CapacityGate>,
}

impl TxStatusMonitor {
    pub fn new(config: Arc<Config>, gate: Arc<CapacityGate>) -> Self {
        Self { config, gate }
    }

    /// Moves the cursor to the finalized tip when nothing is being watched
    pub async fn initialize(&self) -> Result<(), MonitorError> {
        if self.config.store().get_pending_transactions().await?.is_empty() {
            let tip = self.config.chain_client().latest_finalized_block_number().await?;
            self.config.store().set_last_scanned_block(tip).await?;
            info!(block_number = tip, "No pending transactions, starting at the finalized tip");
        }
        Ok(())
    }

    /// scan - Process finalized blocks after the cursor, at most `monitor.max_blocks_per_scan` of them
    pub async fn scan(&self) -> Result<u32, MonitorError> {
        let store = self.config.store();
        let tip = self.config.chain_client().latest_finalized_block_number().await?;
        let mut cursor = store.get_last_scanned_block().await?.unwrap_or(tip.saturating_sub(1));

        let mut processed = 0;
        while cursor < tip && processed < self.config.settings().monitor.max_blocks_per_scan {
            let next = cursor + 1;
            let Some(block) = self.config.chain_client().finalized_block(next).await? else {
                debug!(block_number = next, "Block not finalized yet");
                break;
            };
            self.process_block(&block).await?;
            store.set_last_scanned_block(next).await?;
            cursor = next;
            processed += 1;
        }

        if processed > 0 {
            debug!(processed, cursor, tip, "Scanned finalized blocks");
        }
        Ok(processed)
    }

    pub async fn process_block(&self, block: &FinalizedBlock) -> Result<(), MonitorError> {
        if block.events.iter().any(|record| record.event.is_stake_change()) {
            info!(block_number = block.number, "Capacity stake changed");
            self.gate.signal(CapacitySignal::StakeChanged);
        }

        let pending = self.config.store().get_pending_transactions().await?;
        let mut watched: BTreeMap<&TxHash, Vec<&PendingTransaction>> = BTreeMap::new();
        for transaction in &pending {
            watched.entry(&transaction.tx_hash).or_default().push(transaction);
        }

        let mut resolved = Vec::new();
        let mut resubmissions: Vec<PublisherJob> = Vec::new();
        let mut withdrawn: u128 = 0;
        let mut found_any = false;

        for (tx_hash, entries) in watched {
            if let Some(index) = block.extrinsic_index(tx_hash) {
                found_any = true;
                let events: Vec<&ChainEvent> = block.extrinsic_events(index).collect();
                withdrawn += events
                    .iter()
                    .map(|event| match event {
                        ChainEvent::CapacityWithdrawn { amount, .. } => *amount,
                        _ => 0,
                    })
                    .sum::<u128>();
                resubmissions.extend(self.reconcile(block, tx_hash, &entries, &events));
                resolved.push(tx_hash.clone());
            } else if entries.iter().any(|entry| entry.is_expired(block.number)) {
                warn!(
                    tx_hash = %tx_hash,
                    death = entries[0].death,
                    block_number = block.number,
                    "Transaction expired, resubmitting"
                );
                resubmissions.extend(entries.iter().map(|entry| entry.reference_job.clone()));
                resolved.push(tx_hash.clone());
            }
        }

        if found_any {
            self.record_epoch_usage(block.capacity_epoch, withdrawn).await;
        }

        if !resolved.is_empty() {
            let removed = self.config.store().remove_pending_transactions(&resolved).await?;
            debug!(block_number = block.number, removed, "Removed resolved transactions from the watch list");
        }

        // A resubmitted job must not find its old watch-list entry
        for job in &resubmissions {
            self.resubmit(job).await?;
        }
        Ok(())
    }

    /// Returns the jobs to put back on the publish queue
    fn reconcile(
        &self,
        block: &FinalizedBlock,
        tx_hash: &TxHash,
        entries: &[&PendingTransaction],
        events: &[&ChainEvent],
    ) -> Vec<PublisherJob> {
        let failure = events.iter().find_map(|event| match event {
            ChainEvent::ExtrinsicFailed { error } => Some(error),
            _ => None,
        });

        if let Some(dispatch_error) = failure {
            let action = classify(dispatch_error);
            error!(tx_hash = %tx_hash, block_number = block.number, error = %dispatch_error, ?action, "Transaction failed");
            return self.handle_failure(block, tx_hash, entries, dispatch_error, action);
        }

        if events.iter().any(|event| event.matches(&entries[0].success_event)) {
            info!(tx_hash = %tx_hash, block_number = block.number, jobs = entries.len(), "Transaction succeeded");
            self.notify(block, tx_hash, entries, TxStatus::Succeeded);
        } else {
            error!(tx_hash = %tx_hash, block_number = block.number, "Watched transaction found without a success or failure event");
        }
        Vec::new()
    }

    fn handle_failure(
        &self,
        block: &FinalizedBlock,
        tx_hash: &TxHash,
        entries: &[&PendingTransaction],
        dispatch_error: &DispatchError,
        action: FailureAction,
    ) -> Vec<PublisherJob> {
        match action {
            FailureAction::Retry => entries.iter().map(|entry| entry.reference_job.clone()).collect(),
            FailureAction::PauseAndRetry => {
                warn!(error = %dispatch_error, "Pausing publishing after an unexpected chain error");
                self.gate.signal(CapacitySignal::RecheckAfter(self.config.settings().monitor.pause_recheck()));
                entries.iter().map(|entry| entry.reference_job.clone()).collect()
            }
            FailureAction::Fatal => {
                for entry in entries {
                    warn!(job_id = %entry.reference_job.id, error = %dispatch_error, "Dropping job after a fatal chain error");
                }
                self.notify(block, tx_hash, entries, TxStatus::Failed);
                Vec::new()
            }
        }
    }

    /// Puts `job` back on the publish queue under its original id
    async fn resubmit(&self, job: &PublisherJob) -> Result<(), MonitorError> {
        let queue = self.config.queue();
        queue.remove(QueueType::Publish, &job.id).await?;
        let options =
            EnqueueOptions::for_queue(QueueType::Publish).with_attempts(self.config.settings().publishing.attempts);
        enqueue_json(queue, QueueType::Publish, &job.id, job, Some(options)).await?;
        info!(job_id = %job.id, "Resubmitted publish job");
        Ok(())
    }

    async fn record_epoch_usage(&self, epoch: u32, withdrawn: u128) {
        let result = async {
            let epoch_length = self.config.chain_client().epoch_length().await?;
            let ttl = self.config.block_time() * epoch_length;
            Ok::<_, MonitorError>(self.config.store().increment_epoch_usage(epoch, withdrawn, ttl).await?)
        }
        .await;

        match result {
            Ok(total) => debug!(epoch, withdrawn = %withdrawn, total = %total, "Recorded epoch capacity usage"),
            Err(e) => error!(epoch, error = %e, "Failed to record epoch capacity usage"),
        }
    }

    /// Webhook delivery runs in the background; failures are only logged
    fn notify(&self, block: &FinalizedBlock, tx_hash: &TxHash, entries: &[&PendingTransaction], status: TxStatus) {
        let Some(notifier) = self.config.notifier() else {
            return;
        };
        let notifications: Vec<TxNotification> = entries
            .iter()
            .map(|entry| TxNotification {
                reference_id: entry.reference_job.id.clone(),
                tx_hash: tx_hash.to_string(),
                block_number: block.number,
                schema_id: entry.reference_job.schema_id,
                status,
            })
            .collect();

        tokio::spawn(
            async move {
                for notification in notifications {
                    if let Err(e) = notifier.notify(&notification).await {
                        warn!(reference_id = %notification.reference_id, error = %e, "Webhook notification failed");
                    }
                }
            }
            .in_current_span(),
        );
    }

    /// Scans on every `monitor.scan_interval_seconds` tick until cancelled
    pub async fn run(self: Arc<Self>, cancellation_token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.settings().monitor.scan_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => break,

                _ = interval.tick() => {
                    if let Err(e) = self.scan().await {
                        error!(error = %e, "Block scan failed");
                    }
                }
            }
        }
        debug!("Transaction monitor stopped");
    }
}
