use std::sync::Arc;
use std::time::Duration;

use publisher_chain_client_interface::{
    ChainEvent, DispatchError, EventRecord, EventSelector, MockChainClient, Phase,
};
use rstest::rstest;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::core::client::webhook::{MockNotifier, TxNotification, TxStatus};
use crate::core::timer::TimerRegistry;
use crate::tests::common::{block_with_extrinsic, empty_block, ipfs_job, submitted_tx, EPOCH};
use crate::tests::config::{TestConfigBuilder, TestConfigBuilderReturns};
use crate::types::jobs::PublisherJob;
use crate::types::queue::QueueType;
use crate::types::transaction::PendingTransaction;
use crate::worker::capacity::{CapacityGate, CapacitySignal};
use crate::worker::monitor::TxStatusMonitor;

const TX_HASH: &str = "0xwatched";

struct MonitorFixture {
    services: TestConfigBuilderReturns,
    monitor: TxStatusMonitor,
    signals: UnboundedReceiver<CapacitySignal>,
    notifications: UnboundedReceiver<TxNotification>,
}

fn fixture(mut chain_client: MockChainClient) -> MonitorFixture {
    chain_client.expect_epoch_length().returning(|| Ok(100));

    let (sender, notifications) = mpsc::unbounded_channel();
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().returning(move |notification| {
        sender.send(notification.clone()).unwrap();
        Ok(())
    });

    let services =
        TestConfigBuilder::new().configure_chain_client(chain_client).configure_notifier(Arc::new(notifier)).build();
    let (gate, signals) = CapacityGate::new(services.config.clone(), TimerRegistry::new());
    let monitor = TxStatusMonitor::new(services.config.clone(), Arc::new(gate));
    MonitorFixture { services, monitor, signals, notifications }
}

/// Watches two jobs that went out in the same submission
async fn watch(services: &TestConfigBuilderReturns) -> Vec<PublisherJob> {
    let jobs = vec![ipfs_job("batch-1"), ipfs_job("batch-2")];
    for job in &jobs {
        let pending = PendingTransaction::new(&submitted_tx(TX_HASH), EventSelector::messages_in_block(), job.clone());
        services.config.store().add_pending_transaction(&pending).await.unwrap();
    }
    jobs
}

async fn resubmitted(services: &TestConfigBuilderReturns) -> Vec<PublisherJob> {
    let mut jobs: Vec<PublisherJob> = services
        .queue
        .pending_payloads(QueueType::Publish)
        .await
        .into_iter()
        .map(|(id, payload)| {
            let job: PublisherJob = serde_json::from_str(&payload).unwrap();
            assert_eq!(job.id, id);
            job
        })
        .collect();
    jobs.sort_by(|a, b| a.id.cmp(&b.id));
    jobs
}

fn module_error(error: &str) -> ChainEvent {
    ChainEvent::ExtrinsicFailed { error: DispatchError::Module { pallet: "messages".into(), error: error.into() } }
}

#[rstest]
#[tokio::test]
async fn expired_transaction_is_resubmitted_under_the_same_job_id() {
    let MonitorFixture { services, monitor, .. } = fixture(MockChainClient::new());
    let jobs = watch(&services).await;

    // still valid one block before death
    monitor.process_block(&empty_block(63)).await.unwrap();
    assert_eq!(services.config.store().get_pending_transactions().await.unwrap().len(), 2);
    assert!(resubmitted(&services).await.is_empty());

    monitor.process_block(&empty_block(64)).await.unwrap();

    assert_eq!(resubmitted(&services).await, jobs);
    assert!(services.config.store().get_pending_transactions().await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn successful_transaction_is_reconciled_and_its_usage_recorded() {
    let MonitorFixture { services, monitor, mut notifications, .. } = fixture(MockChainClient::new());
    watch(&services).await;
    let block = block_with_extrinsic(
        20,
        TX_HASH,
        vec![
            ChainEvent::CapacityWithdrawn { msa_id: 1, amount: 120 },
            ChainEvent::MessagesInBlock,
            ChainEvent::ExtrinsicSuccess,
        ],
    );

    monitor.process_block(&block).await.unwrap();

    assert!(services.config.store().get_pending_transactions().await.unwrap().is_empty());
    assert!(resubmitted(&services).await.is_empty());
    assert_eq!(services.config.store().get_epoch_usage(EPOCH).await.unwrap(), 120);

    let mut reference_ids = Vec::new();
    for _ in 0..2 {
        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.status, TxStatus::Succeeded);
        assert_eq!(notification.block_number, 20);
        assert_eq!(notification.tx_hash, TX_HASH);
        reference_ids.push(notification.reference_id);
    }
    reference_ids.sort();
    assert_eq!(reference_ids, vec!["batch-1", "batch-2"]);
}

#[rstest]
#[case::retryable("TooManyMessagesInBlock", true, false)]
#[case::fatal("InvalidSchemaId", false, false)]
#[case::unknown("SomethingNew", true, true)]
#[tokio::test]
async fn failed_transaction_follows_its_error_classification(
    #[case] error: &str,
    #[case] resubmits: bool,
    #[case] pauses: bool,
) {
    let MonitorFixture { services, monitor, mut signals, mut notifications } = fixture(MockChainClient::new());
    let jobs = watch(&services).await;
    let block = block_with_extrinsic(
        20,
        TX_HASH,
        vec![ChainEvent::CapacityWithdrawn { msa_id: 1, amount: 40 }, module_error(error)],
    );

    monitor.process_block(&block).await.unwrap();

    assert!(services.config.store().get_pending_transactions().await.unwrap().is_empty());
    let expected: Vec<PublisherJob> = if resubmits { jobs } else { Vec::new() };
    assert_eq!(resubmitted(&services).await, expected);
    // fees are charged for failed extrinsics too
    assert_eq!(services.config.store().get_epoch_usage(EPOCH).await.unwrap(), 40);

    if pauses {
        assert_eq!(signals.try_recv().unwrap(), CapacitySignal::RecheckAfter(Duration::from_secs(60)));
    } else {
        assert!(signals.try_recv().is_err());
    }

    if !resubmits {
        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.status, TxStatus::Failed);
    }
}

#[rstest]
#[tokio::test]
async fn stake_change_triggers_a_capacity_recheck() {
    let MonitorFixture { monitor, mut signals, .. } = fixture(MockChainClient::new());
    let mut block = empty_block(30);
    block.events.push(EventRecord { phase: Phase::ApplyExtrinsic(0), event: ChainEvent::CapacityStaked { target: 1, amount: 5 } });

    monitor.process_block(&block).await.unwrap();

    assert_eq!(signals.try_recv().unwrap(), CapacitySignal::StakeChanged);
}

#[rstest]
#[tokio::test]
async fn scan_stops_at_the_first_block_not_yet_available() {
    let mut chain_client = MockChainClient::new();
    chain_client.expect_latest_finalized_block_number().returning(|| Ok(13));
    chain_client.expect_finalized_block().returning(|number| Ok((number < 12).then(|| empty_block(number))));
    let MonitorFixture { services, monitor, .. } = fixture(chain_client);
    services.config.store().set_last_scanned_block(9).await.unwrap();

    let processed = monitor.scan().await.unwrap();

    assert_eq!(processed, 2);
    assert_eq!(services.config.store().get_last_scanned_block().await.unwrap(), Some(11));
}

#[rstest]
#[tokio::test]
async fn scan_resumes_from_the_stored_cursor_and_resubmits_expired_jobs() {
    let mut chain_client = MockChainClient::new();
    chain_client.expect_latest_finalized_block_number().returning(|| Ok(64));
    chain_client.expect_finalized_block().times(2).returning(|number| Ok(Some(empty_block(number))));
    let MonitorFixture { services, monitor, .. } = fixture(chain_client);
    let jobs = watch(&services).await;
    services.config.store().set_last_scanned_block(62).await.unwrap();

    assert_eq!(monitor.scan().await.unwrap(), 2);

    assert_eq!(resubmitted(&services).await, jobs);
    assert_eq!(services.config.store().get_last_scanned_block().await.unwrap(), Some(64));
}

#[rstest]
#[tokio::test]
async fn empty_watch_list_starts_at_the_finalized_tip() {
    let mut chain_client = MockChainClient::new();
    chain_client.expect_latest_finalized_block_number().returning(|| Ok(500));
    let MonitorFixture { services, monitor, .. } = fixture(chain_client);

    monitor.initialize().await.unwrap();

    assert_eq!(services.config.store().get_last_scanned_block().await.unwrap(), Some(500));
}

#[rstest]
#[tokio::test]
async fn pending_transactions_keep_the_stored_cursor_on_startup() {
    let MonitorFixture { services, monitor, .. } = fixture(MockChainClient::new());
    watch(&services).await;
    services.config.store().set_last_scanned_block(42).await.unwrap();

    monitor.initialize().await.unwrap();

    assert_eq!(services.config.store().get_last_scanned_block().await.unwrap(), Some(42));
}
