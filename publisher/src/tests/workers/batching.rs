use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use publisher_chain_client_interface::MockChainClient;
use rstest::rstest;
use uuid::Uuid;

use crate::core::client::queue::QueuedJob;
use crate::core::timer::TimerRegistry;
use crate::error::job::batching::BatchingError;
use crate::tests::common::{broadcast, queued_job, BROADCAST_SCHEMA_ID};
use crate::tests::config::{TestConfigBuilder, TestConfigBuilderReturns};
use crate::types::batch::{BatchMetadata, BatchRecord, LockedBatch, OpenBatch, PartitionBatchState};
use crate::types::jobs::BatchQueueJob;
use crate::types::queue::QueueType;
use crate::worker::batching::{batch_timeout_name, AnnouncementBatchingProcessor, BatchAccumulator, CloseOutcome};
use crate::worker::controller::JobProcessor;
use crate::worker::schema::SchemaRegistry;

const QUEUE: QueueType = QueueType::Broadcast;

fn chain_client() -> MockChainClient {
    let mut chain_client = MockChainClient::new();
    chain_client
        .expect_get_schema_id_by_name()
        .returning(|_, name| Ok((name == "broadcast").then_some(BROADCAST_SCHEMA_ID)));
    chain_client
}

fn services(max_count: u64, max_lock_recoveries: u32) -> TestConfigBuilderReturns {
    TestConfigBuilder::new()
        .configure_settings(|settings| {
            settings.batching.max_count = max_count;
            settings.batching.max_lock_recoveries = max_lock_recoveries;
        })
        .configure_chain_client(chain_client())
        .build()
}

fn accumulator(services: &TestConfigBuilderReturns, timers: &TimerRegistry) -> Arc<BatchAccumulator> {
    let schemas = Arc::new(SchemaRegistry::new(services.config.clone()));
    BatchAccumulator::new(services.config.clone(), timers.clone(), schemas)
}

/// Batch jobs waiting in the batch queue, keyed by batch id
async fn queued_batches(services: &TestConfigBuilderReturns) -> Vec<(String, BatchQueueJob)> {
    let mut batches: Vec<(String, BatchQueueJob)> = services
        .queue
        .pending_payloads(QueueType::BatchAnnouncement)
        .await
        .into_iter()
        .map(|(id, payload)| (id, serde_json::from_str(&payload).unwrap()))
        .collect();
    batches.sort_by(|a, b| a.0.cmp(&b.0));
    batches
}

fn records(from_ids: &[u64]) -> Vec<BatchRecord> {
    from_ids.iter().map(|id| BatchRecord { job_id: format!("job-{id}"), announcement: broadcast(*id) }).collect()
}

#[rstest]
#[tokio::test]
async fn first_append_opens_a_batch_and_arms_its_close_timer() {
    let services = services(1000, 3);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);

    let row_count = accumulator.append(QUEUE, "job-1", &broadcast(1)).await.unwrap();

    assert_eq!(row_count, 1);
    let metadata = services.config.store().get_open_batch_metadata(QUEUE).await.unwrap().unwrap();
    assert_eq!(metadata.row_count, 1);
    assert!(timers.exists(&batch_timeout_name(QUEUE, metadata.batch_id)));
    assert!(queued_batches(&services).await.is_empty());
    timers.cancel_all();
}

#[rstest]
#[tokio::test]
async fn batch_closes_as_soon_as_it_is_full() {
    let services = services(3, 3);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);

    for id in 1..=3 {
        accumulator.append(QUEUE, &format!("job-{id}"), &broadcast(id)).await.unwrap();
    }

    assert_eq!(services.config.store().get_open_batch_metadata(QUEUE).await.unwrap(), None);
    assert!(services.store.batch_state(QUEUE).await.is_empty());

    let batches = queued_batches(&services).await;
    assert_eq!(batches.len(), 1);
    let (job_id, job) = &batches[0];
    let batch = assert_matches!(job, BatchQueueJob::New(batch) => batch);
    assert_eq!(job_id, &batch.batch_id.to_string());
    assert_eq!(batch.schema_id, BROADCAST_SCHEMA_ID);
    assert_eq!(batch.announcements, vec![broadcast(1), broadcast(2), broadcast(3)]);
    assert!(!timers.exists(&batch_timeout_name(QUEUE, batch.batch_id)));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn batch_closes_when_its_interval_elapses() {
    let services = services(100, 3);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);

    accumulator.append(QUEUE, "job-1", &broadcast(1)).await.unwrap();
    accumulator.append(QUEUE, "job-2", &broadcast(2)).await.unwrap();
    let batch_id = services.config.store().get_open_batch_metadata(QUEUE).await.unwrap().unwrap().batch_id;

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(queued_batches(&services).await.is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let batches = queued_batches(&services).await;
    assert_eq!(batches.len(), 1);
    let batch = assert_matches!(&batches[0].1, BatchQueueJob::New(batch) => batch);
    assert_eq!(batch.batch_id, batch_id);
    assert_eq!(batch.announcements.len(), 2);
    assert!(!timers.exists(&batch_timeout_name(QUEUE, batch_id)));
    assert!(services.store.batch_state(QUEUE).await.is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn redelivered_first_row_keeps_the_original_close_deadline() {
    let services = services(100, 3);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);

    accumulator.append(QUEUE, "job-1", &broadcast(1)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(accumulator.append(QUEUE, "job-1", &broadcast(1)).await.unwrap(), 1);

    // 13s after the batch opened, well before a re-armed timer would fire
    tokio::time::sleep(Duration::from_secs(5)).await;
    let batches = queued_batches(&services).await;
    assert_eq!(batches.len(), 1);
    let batch = assert_matches!(&batches[0].1, BatchQueueJob::New(batch) => batch);
    assert_eq!(batch.announcements, vec![broadcast(1)]);
}

#[rstest]
#[tokio::test]
async fn stale_timeout_leaves_the_next_batch_alone() {
    let services = services(1000, 3);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);
    accumulator.append(QUEUE, "job-1", &broadcast(1)).await.unwrap();

    let outcome = accumulator.close_batch(QUEUE, Uuid::new_v4(), true).await.unwrap();

    assert_eq!(outcome, CloseOutcome::NothingToClose);
    assert_eq!(services.config.store().get_open_batch_metadata(QUEUE).await.unwrap().unwrap().row_count, 1);
    timers.cancel_all();
}

#[rstest]
#[tokio::test]
async fn abandoned_lock_is_drained_before_the_open_batch() {
    let services = services(1000, 3);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);

    let now = Utc::now();
    let abandoned = BatchMetadata { row_count: 2, ..BatchMetadata::new(now - chrono::Duration::seconds(60)) };
    let open = BatchMetadata { row_count: 1, ..BatchMetadata::new(now) };
    services
        .store
        .replace_batch_state(
            QUEUE,
            PartitionBatchState {
                open: Some(OpenBatch { metadata: open.clone(), records: records(&[3]) }),
                locked: Some(LockedBatch {
                    metadata: abandoned.clone(),
                    records: records(&[1, 2]),
                    lock_expires_at: now - chrono::Duration::seconds(30),
                }),
            },
        )
        .await;

    let outcome = accumulator.close_batch(QUEUE, open.batch_id, false).await.unwrap();

    assert_eq!(outcome, CloseOutcome::Closed { batch_id: open.batch_id, row_count: 1 });
    let batch_ids: HashSet<String> = queued_batches(&services).await.into_iter().map(|(id, _)| id).collect();
    assert_eq!(batch_ids, HashSet::from([abandoned.batch_id.to_string(), open.batch_id.to_string()]));
    assert!(services.store.batch_state(QUEUE).await.is_empty());
}

#[rstest]
#[tokio::test]
async fn abandoned_lock_recovery_is_bounded() {
    let services = services(1000, 0);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);

    let now = Utc::now();
    let abandoned = BatchMetadata { row_count: 1, ..BatchMetadata::new(now) };
    services
        .store
        .replace_batch_state(
            QUEUE,
            PartitionBatchState {
                open: None,
                locked: Some(LockedBatch {
                    metadata: abandoned.clone(),
                    records: records(&[1]),
                    lock_expires_at: now - chrono::Duration::seconds(1),
                }),
            },
        )
        .await;

    let error = accumulator.close_batch(QUEUE, abandoned.batch_id, false).await.unwrap_err();

    assert_matches!(
        error,
        BatchingError::AbandonedLockNotCleared { batch_id, attempts: 0, .. } if batch_id == abandoned.batch_id
    );
}

#[rstest]
#[tokio::test]
async fn close_is_deferred_while_another_closer_holds_the_lock() {
    let services = services(1000, 3);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);

    let now = Utc::now();
    let open = BatchMetadata { row_count: 1, ..BatchMetadata::new(now) };
    let draining = BatchMetadata { row_count: 1, ..BatchMetadata::new(now) };
    services
        .store
        .replace_batch_state(
            QUEUE,
            PartitionBatchState {
                open: Some(OpenBatch { metadata: open.clone(), records: records(&[2]) }),
                locked: Some(LockedBatch {
                    metadata: draining,
                    records: records(&[1]),
                    lock_expires_at: now + chrono::Duration::seconds(30),
                }),
            },
        )
        .await;

    let outcome = accumulator.close_batch(QUEUE, open.batch_id, false).await.unwrap();

    assert_eq!(outcome, CloseOutcome::Deferred);
    assert!(queued_batches(&services).await.is_empty());
}

#[rstest]
#[case::expired_while_offline(20, true)]
#[case::still_young(2, false)]
#[tokio::test]
async fn restart_recovers_the_open_batch(#[case] age_seconds: i64, #[case] closes_immediately: bool) {
    let services = services(1000, 3);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);

    let metadata = BatchMetadata { row_count: 1, ..BatchMetadata::new(Utc::now() - chrono::Duration::seconds(age_seconds)) };
    services
        .store
        .replace_batch_state(
            QUEUE,
            PartitionBatchState { open: Some(OpenBatch { metadata: metadata.clone(), records: records(&[1]) }), locked: None },
        )
        .await;

    accumulator.setup_active_batch_timeout(QUEUE).await.unwrap();

    let timer_armed = timers.exists(&batch_timeout_name(QUEUE, metadata.batch_id));
    assert_eq!(timer_armed, !closes_immediately);
    assert_eq!(queued_batches(&services).await.len(), usize::from(closes_immediately));
    timers.cancel_all();
}

#[rstest]
#[tokio::test]
async fn announcement_of_another_type_is_rejected() {
    let services = services(1000, 3);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);

    let error = accumulator.append(QueueType::Reply, "job-1", &broadcast(1)).await.unwrap_err();

    assert_matches!(error, BatchingError::AnnouncementTypeMismatch { queue: QueueType::Reply, .. });
    assert!(services.store.batch_state(QueueType::Reply).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_land_in_exactly_one_batch() {
    let services = services(10, 3);
    let timers = TimerRegistry::new();
    let accumulator = accumulator(&services, &timers);

    let mut handles = Vec::new();
    for id in 0..45u64 {
        let accumulator = accumulator.clone();
        handles.push(tokio::spawn(async move { accumulator.append(QUEUE, &format!("job-{id}"), &broadcast(id)).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut seen = Vec::new();
    for (_, job) in queued_batches(&services).await {
        let batch = assert_matches!(job, BatchQueueJob::New(batch) => batch);
        seen.extend(batch.announcements.iter().map(|announcement| announcement.from_id()));
    }
    let state = services.store.batch_state(QUEUE).await;
    if let Some(open) = state.open {
        seen.extend(open.records.iter().map(|record| record.announcement.from_id()));
    }

    seen.sort_unstable();
    assert_eq!(seen, (0..45u64).collect::<Vec<_>>());
    timers.cancel_all();
}

#[rstest]
#[tokio::test]
async fn processor_appends_the_queued_announcement() {
    let services = services(1000, 3);
    let timers = TimerRegistry::new();
    let processor = AnnouncementBatchingProcessor::new(accumulator(&services, &timers));

    let job: QueuedJob = queued_job(QUEUE, "job-1", &broadcast(1));
    processor.process(&job).await.unwrap();
    // redelivery of the same job
    processor.process(&job).await.unwrap();

    let state = services.store.batch_state(QUEUE).await;
    assert_eq!(state.open.unwrap().records, records(&[1]));
    timers.cancel_all();
}
