use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::future::join_all;
use publisher_chain_client_interface::{ChainClientError, EventSelector, MockChainClient, TxHash};
use rstest::rstest;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

use crate::core::timer::TimerRegistry;
use crate::error::job::publish::PublishError;
use crate::error::job::JobError;
use crate::tests::common::{capacity_info, ipfs_job, on_chain_job, queued_job, submitted_tx};
use crate::tests::config::{TestConfigBuilder, TestConfigBuilderReturns};
use crate::types::queue::QueueType;
use crate::worker::capacity::{CapacityGate, CapacitySignal};
use crate::worker::controller::JobProcessor;
use crate::worker::publisher::message_publisher::{BatchSubmission, PublishOutcome};
use crate::worker::publisher::{MessagePublisher, PublishingService};

fn services(chain_client: MockChainClient, max_batch_size: usize) -> TestConfigBuilderReturns {
    TestConfigBuilder::new()
        .configure_settings(|settings| settings.publishing.max_batch_size = max_batch_size)
        .configure_chain_client(chain_client)
        .build()
}

fn chain_with_capacity() -> MockChainClient {
    let mut chain_client = MockChainClient::new();
    chain_client.expect_capacity_info().returning(|_| Ok(capacity_info(10_000, 10_000)));
    chain_client
}

fn publishing_service(services: &TestConfigBuilderReturns) -> (PublishingService, UnboundedReceiver<CapacitySignal>) {
    let (gate, receiver) = CapacityGate::new(services.config.clone(), TimerRegistry::new());
    let publisher = Arc::new(MessagePublisher::new(services.config.clone()));
    (PublishingService::new(services.config.clone(), Arc::new(gate), publisher), receiver)
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn concurrent_publishes_share_one_submission() {
    let mut chain_client = MockChainClient::new();
    chain_client
        .expect_submit_with_capacity()
        .times(1)
        .withf(|calls| calls.len() == 5)
        .returning(|_| Ok(submitted_tx("0xbatch")));
    let services = services(chain_client, 10);
    let publisher = Arc::new(MessagePublisher::new(services.config.clone()));

    let started = Instant::now();
    let results = join_all((0..5).map(|n| {
        let publisher = publisher.clone();
        async move { publisher.publish(ipfs_job(&format!("job-{n}"))).await }
    }))
    .await;

    assert!(started.elapsed() >= Duration::from_secs(6));
    for result in results {
        assert_matches!(result.unwrap(), PublishOutcome::Submitted(BatchSubmission { tx, jobs, unattended }) => {
            assert_eq!(tx, submitted_tx("0xbatch"));
            assert_eq!(jobs.len(), 5);
            assert!(unattended.is_empty());
        });
    }
    assert_eq!(publisher.pending_len(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn full_batch_is_submitted_before_the_block_time() {
    let mut chain_client = MockChainClient::new();
    chain_client.expect_submit_with_capacity().times(1).returning(|_| Ok(submitted_tx("0xfull")));
    let services = services(chain_client, 2);
    let publisher = Arc::new(MessagePublisher::new(services.config.clone()));

    let started = Instant::now();
    let (first, second) = tokio::join!(publisher.publish(ipfs_job("job-1")), publisher.publish(ipfs_job("job-2")));

    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(first.unwrap(), second.unwrap());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failed_submission_keeps_jobs_for_the_next_batch() {
    let submissions = Arc::new(AtomicUsize::new(0));
    let counter = submissions.clone();
    let mut chain_client = MockChainClient::new();
    chain_client.expect_submit_with_capacity().times(2).returning(move |calls| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err(ChainClientError::Rpc("connection reset".into())),
            _ => {
                assert_eq!(calls.len(), 2);
                Ok(submitted_tx("0xretry"))
            }
        }
    });
    let services = services(chain_client, 10);
    let publisher = Arc::new(MessagePublisher::new(services.config.clone()));

    let (first, second) = tokio::join!(publisher.publish(ipfs_job("job-1")), publisher.publish(ipfs_job("job-2")));
    assert_matches!(first, Err(PublishError::ChainClientError(ChainClientError::Rpc(_))));
    assert_eq!(first, second);
    assert_eq!(publisher.pending_len(), 2);

    // the redelivered job does not enter the pending queue twice
    let retried = publisher.publish(ipfs_job("job-1")).await.unwrap();
    assert_matches!(retried, PublishOutcome::Submitted(submission) => {
        assert_eq!(submission.tx.tx_hash, TxHash::from("0xretry"));
        assert_eq!(submission.unattended, vec!["job-2".to_string()]);
        assert_eq!(submission.jobs_to_watch("job-1").count(), 2);
    });
    assert_eq!(publisher.pending_len(), 0);

    // job-2 went out with the retry while nobody waited for it
    let redelivered = publisher.publish(ipfs_job("job-2")).await.unwrap();
    assert_eq!(redelivered, PublishOutcome::AlreadySubmitted(submitted_tx("0xretry")));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn released_job_is_published_again() {
    let submissions = Arc::new(AtomicUsize::new(0));
    let counter = submissions.clone();
    let mut chain_client = MockChainClient::new();
    chain_client.expect_submit_with_capacity().times(3).returning(move |_| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err(ChainClientError::Rpc("connection reset".into())),
            1 => Ok(submitted_tx("0xfirst")),
            _ => Ok(submitted_tx("0xsecond")),
        }
    });
    let services = services(chain_client, 10);
    let publisher = Arc::new(MessagePublisher::new(services.config.clone()));

    assert!(publisher.publish(ipfs_job("job-1")).await.is_err());
    let submission = assert_matches!(publisher.publish(ipfs_job("job-2")).await, Ok(PublishOutcome::Submitted(s)) => s);
    publisher.release_unattended(&submission.unattended);

    // a resubmission after the watch-list entry was resolved goes out again
    let again = publisher.publish(ipfs_job("job-1")).await.unwrap();
    assert_matches!(again, PublishOutcome::Submitted(s) if s.tx == submitted_tx("0xsecond"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn job_kept_after_a_failure_is_watched_and_not_submitted_twice() {
    let submissions = Arc::new(AtomicUsize::new(0));
    let counter = submissions.clone();
    let mut chain_client = chain_with_capacity();
    chain_client.expect_submit_with_capacity().times(2).returning(move |_| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err(ChainClientError::Rpc("connection reset".into())),
            _ => Ok(submitted_tx("0xshared")),
        }
    });
    let services = services(chain_client, 10);
    let (service, _receiver) = publishing_service(&services);

    let first = ipfs_job("job-1");
    let second = ipfs_job("job-2");
    let error = service.process(&queued_job(QueueType::Publish, &first.id, &first)).await.unwrap_err();
    assert_matches!(error, JobError::PublishError(PublishError::ChainClientError(_)));

    service.process(&queued_job(QueueType::Publish, &second.id, &second)).await.unwrap();

    let mut watched: Vec<(TxHash, String)> = services
        .config
        .store()
        .get_pending_transactions()
        .await
        .unwrap()
        .into_iter()
        .map(|pending| (pending.tx_hash, pending.reference_job.id))
        .collect();
    watched.sort();
    assert_eq!(
        watched,
        vec![(TxHash::from("0xshared"), "job-1".to_string()), (TxHash::from("0xshared"), "job-2".to_string())]
    );

    service.process(&queued_job(QueueType::Publish, &first.id, &first)).await.unwrap();

    assert_eq!(submissions.load(Ordering::SeqCst), 2);
    assert_eq!(services.config.store().get_pending_transactions().await.unwrap().len(), 2);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn published_job_is_added_to_the_watch_list() {
    let mut chain_client = chain_with_capacity();
    chain_client.expect_submit_with_capacity().times(1).returning(|_| Ok(submitted_tx("0xwatched")));
    let services = services(chain_client, 10);
    let (service, _receiver) = publishing_service(&services);

    let job = ipfs_job("batch-1");
    service.process(&queued_job(QueueType::Publish, &job.id, &job)).await.unwrap();

    let pending = services.config.store().get_pending_transactions().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tx_hash, TxHash::from("0xwatched"));
    assert_eq!(pending[0].reference_job, job);
    assert_eq!(pending[0].success_event, EventSelector::messages_in_block());
    assert_eq!((pending[0].birth, pending[0].death), (0, 64));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn nonce_conflict_delays_the_job_by_one_block() {
    let mut chain_client = chain_with_capacity();
    chain_client
        .expect_submit_with_capacity()
        .returning(|_| Err(ChainClientError::NonceConflict("Priority is too low".into())));
    let services = services(chain_client, 10);
    let (service, _receiver) = publishing_service(&services);

    let job = ipfs_job("batch-1");
    let error = service.process(&queued_job(QueueType::Publish, &job.id, &job)).await.unwrap_err();

    assert_matches!(error, JobError::Delayed { delay, .. } if delay == Duration::from_secs(6));
    assert!(services.config.store().get_pending_transactions().await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn revoked_delegation_fails_the_job_permanently() {
    let mut chain_client = chain_with_capacity();
    chain_client.expect_check_delegation().times(1).returning(|_, _, _| Ok(false));
    chain_client.expect_submit_with_capacity().never();
    let services = services(chain_client, 10);
    let (service, _receiver) = publishing_service(&services);

    let job = on_chain_job("onchain-1", 42);
    let error = service.process(&queued_job(QueueType::Publish, &job.id, &job)).await.unwrap_err();

    assert_matches!(error, JobError::Unrecoverable(_));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn capacity_failure_signals_the_gate() {
    let mut chain_client = chain_with_capacity();
    chain_client
        .expect_submit_with_capacity()
        .returning(|_| Err(ChainClientError::Rpc("1010: Invalid Transaction: Inability to pay some fees".into())));
    let services = services(chain_client, 10);
    let (service, mut receiver) = publishing_service(&services);

    let job = ipfs_job("batch-1");
    let error = service.process(&queued_job(QueueType::Publish, &job.id, &job)).await.unwrap_err();

    assert_matches!(error, JobError::PublishError(e) if e.is_capacity_exhausted());
    assert_eq!(receiver.try_recv().unwrap(), CapacitySignal::Exhausted);
}

#[rstest]
#[tokio::test]
async fn insufficient_capacity_delays_without_submitting() {
    let mut chain_client = MockChainClient::new();
    chain_client.expect_capacity_info().returning(|_| Ok(capacity_info(0, 10_000)));
    chain_client.expect_submit_with_capacity().never();
    let services = services(chain_client, 10);
    let (service, _receiver) = publishing_service(&services);

    let job = ipfs_job("batch-1");
    let error = service.process(&queued_job(QueueType::Publish, &job.id, &job)).await.unwrap_err();

    assert_matches!(error, JobError::Delayed { .. });
    assert!(services.config.queue().is_paused(QueueType::Publish).await.unwrap());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn watched_job_is_submitted_again_only_after_its_entry_is_resolved() {
    let mut chain_client = chain_with_capacity();
    chain_client.expect_submit_with_capacity().times(2).returning(|_| Ok(submitted_tx("0xwatched")));
    let services = services(chain_client, 10);
    let (service, _receiver) = publishing_service(&services);
    let job = ipfs_job("batch-1");
    let queued = queued_job(QueueType::Publish, &job.id, &job);

    service.process(&queued).await.unwrap();
    // redelivery while the transaction is still watched
    service.process(&queued).await.unwrap();
    let watched = services.config.store().get_pending_transaction_for_job(&job.id).await.unwrap();
    assert_eq!(watched.map(|pending| pending.tx_hash), Some(TxHash::from("0xwatched")));

    services.config.store().remove_pending_transactions(&[TxHash::from("0xwatched")]).await.unwrap();
    service.process(&queued).await.unwrap();

    assert_eq!(services.config.store().get_pending_transactions().await.unwrap().len(), 1);
}
