use std::sync::{Arc, Mutex};
use std::time::Duration;

use publisher_chain_client_interface::{CapacityInfo, MockChainClient};
use rstest::rstest;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use crate::core::client::queue::EnqueueOptions;
use crate::core::timer::TimerRegistry;
use crate::tests::common::{capacity_info, EPOCH};
use crate::tests::config::{TestConfigBuilder, TestConfigBuilderReturns};
use crate::types::capacity::CapacityLimit;
use crate::types::queue::QueueType;
use crate::worker::capacity::{CapacityGate, CapacitySignal, CAPACITY_EPOCH_TIMEOUT};

/// Chain client whose capacity answer can be swapped while the test runs
fn chain_client(info: Arc<Mutex<CapacityInfo>>) -> MockChainClient {
    let mut chain_client = MockChainClient::new();
    chain_client.expect_capacity_info().returning(move |_| Ok(info.lock().unwrap().clone()));
    chain_client
}

fn services(info: Arc<Mutex<CapacityInfo>>, total_limit: Option<CapacityLimit>) -> TestConfigBuilderReturns {
    TestConfigBuilder::new()
        .configure_settings(|settings| settings.capacity.total_limit = total_limit)
        .configure_chain_client(chain_client(info))
        .build()
}

/// Enqueues `id` with a single attempt and fails it with `reason`
async fn failed_publish_job(services: &TestConfigBuilderReturns, id: &str, reason: &str) {
    let queue = services.config.queue();
    queue.enqueue(QueueType::Publish, id, "{}".into(), EnqueueOptions::for_queue(QueueType::Publish).with_attempts(1)).await.unwrap();
    let job = queue.consume(QueueType::Publish).await.unwrap().unwrap();
    queue.fail(QueueType::Publish, &job.id, reason, false).await.unwrap();
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn exhausted_capacity_pauses_publishing_until_the_next_epoch() {
    let info = Arc::new(Mutex::new(capacity_info(0, 1_000)));
    let services = services(info.clone(), None);
    failed_publish_job(&services, "capacity-job", "Chain client error: Inability to pay some fees: 1010").await;
    failed_publish_job(&services, "other-job", "Chain RPC request failed: connection reset").await;

    let timers = TimerRegistry::new();
    let (gate, receiver) = CapacityGate::new(services.config.clone(), timers.clone());
    let gate = Arc::new(gate);

    assert!(!gate.check_for_sufficient_capacity().await.unwrap());
    assert!(gate.is_exhausted());
    assert!(services.config.queue().is_paused(QueueType::Publish).await.unwrap());
    assert!(timers.exists(CAPACITY_EPOCH_TIMEOUT));

    let token = CancellationToken::new();
    let gate_task = tokio::spawn(gate.clone().run(receiver, token.clone()));

    // 10 blocks of 6 seconds until the epoch starts
    *info.lock().unwrap() = CapacityInfo { current_block_number: 110, next_epoch_start: 210, ..capacity_info(1_000, 1_000) };
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(services.config.queue().is_paused(QueueType::Publish).await.unwrap());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!gate.is_exhausted());
    assert!(!services.config.queue().is_paused(QueueType::Publish).await.unwrap());
    assert!(!timers.exists(CAPACITY_EPOCH_TIMEOUT));

    let failed = services.config.queue().list_failed(QueueType::Publish).await.unwrap();
    let failed_ids: Vec<_> = failed.iter().map(|job| job.id.as_str()).collect();
    assert_eq!(failed_ids, vec!["other-job"]);
    let retried = services.config.queue().consume(QueueType::Publish).await.unwrap().unwrap();
    assert_eq!(retried.id, "capacity-job");

    token.cancel();
    gate_task.await.unwrap();
}

#[rstest]
#[case::below_service_limit(799, None, true)]
#[case::service_limit_reached(800, None, false)]
#[case::total_limit_reached(0, Some(CapacityLimit::amount(300)), false)]
#[case::below_total_limit(0, Some(CapacityLimit::percentage(50)), true)]
#[tokio::test]
async fn configured_limits_gate_publishing(
    #[case] used_this_epoch: u128,
    #[case] total_limit: Option<CapacityLimit>,
    #[case] expected: bool,
) {
    // 400 of 1000 issued capacity already spent by the provider
    let info = Arc::new(Mutex::new(capacity_info(600, 1_000)));
    let services = services(info, total_limit);
    services.config.store().increment_epoch_usage(EPOCH, used_this_epoch, Duration::from_secs(3600)).await.unwrap();
    let timers = TimerRegistry::new();
    let (gate, _receiver) = CapacityGate::new(services.config.clone(), timers.clone());

    assert_eq!(gate.check_for_sufficient_capacity().await.unwrap(), expected);
    assert_eq!(services.config.queue().is_paused(QueueType::Publish).await.unwrap(), !expected);
    timers.cancel_all();
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn recheck_signal_pauses_then_resumes_after_the_delay() {
    let info = Arc::new(Mutex::new(capacity_info(1_000, 1_000)));
    let services = services(info, None);
    let timers = TimerRegistry::new();
    let (gate, receiver) = CapacityGate::new(services.config.clone(), timers.clone());
    let gate = Arc::new(gate);
    let token = CancellationToken::new();
    let gate_task = tokio::spawn(gate.clone().run(receiver, token.clone()));

    gate.signal(CapacitySignal::RecheckAfter(Duration::from_secs(30)));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(services.config.queue().is_paused(QueueType::Publish).await.unwrap());
    assert!(timers.exists(CAPACITY_EPOCH_TIMEOUT));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!services.config.queue().is_paused(QueueType::Publish).await.unwrap());

    token.cancel();
    gate_task.await.unwrap();
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn exhausted_signal_pauses_without_waiting_for_a_check() {
    let info = Arc::new(Mutex::new(capacity_info(500, 1_000)));
    let services = services(info, None);
    let timers = TimerRegistry::new();
    let (gate, _receiver) = CapacityGate::new(services.config.clone(), timers.clone());

    gate.handle_signal(CapacitySignal::Exhausted).await.unwrap();

    assert!(gate.is_exhausted());
    assert!(services.config.queue().is_paused(QueueType::Publish).await.unwrap());
    assert!(timers.exists(CAPACITY_EPOCH_TIMEOUT));
    timers.cancel_all();
}

#[rstest]
#[traced_test]
#[tokio::test(start_paused = true)]
async fn epoch_timer_outliving_the_gate_task_is_logged() {
    let info = Arc::new(Mutex::new(capacity_info(0, 1_000)));
    let services = services(info, None);
    let timers = TimerRegistry::new();
    let (gate, receiver) = CapacityGate::new(services.config.clone(), timers.clone());
    drop(receiver);

    assert!(!gate.check_for_sufficient_capacity().await.unwrap());
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert!(!timers.exists(CAPACITY_EPOCH_TIMEOUT));
    assert!(logs_contain("Capacity gate is no longer listening"));
}
