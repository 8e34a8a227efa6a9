use std::sync::{Arc, Mutex};

use arrow::array::{Array, BinaryArray, Int32Array, StringArray, UInt64Array};
use assert_matches::assert_matches;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use publisher_chain_client_interface::{MockChainClient, ModelType, SchemaInfo};
use rstest::rstest;
use uuid::Uuid;

use crate::core::client::storage::{ContentStat, MockContentStore, PinnedContent, BATCH_FILE_MIME_TYPE};
use crate::error::job::announcer::AnnouncerError;
use crate::tests::common::{broadcast, broadcast_schema, queued_job, BROADCAST_SCHEMA_ID};
use crate::tests::config::{TestConfigBuilder, TestConfigBuilderReturns};
use crate::types::jobs::{BatchAnnouncerJob, BatchQueueJob, ExistingBatchFile, PublisherJob, PublisherPayload};
use crate::types::queue::QueueType;
use crate::worker::announcer::{BatchAnnouncementProcessor, BatchAnnouncer};
use crate::worker::controller::JobProcessor;
use crate::worker::schema::SchemaRegistry;

const CID: &str = "bafybeibatchfile";

fn chain_client(schema: SchemaInfo) -> MockChainClient {
    let mut chain_client = MockChainClient::new();
    chain_client.expect_get_schema().returning(move |_| Ok(Some(schema.clone())));
    chain_client
}

/// Content store that records every pinned file
fn content_store(pinned: Arc<Mutex<Vec<Bytes>>>) -> MockContentStore {
    let mut content_store = MockContentStore::new();
    content_store.expect_pin().returning(move |mime_type, data| {
        assert_eq!(mime_type, BATCH_FILE_MIME_TYPE);
        let size = data.len() as u64;
        pinned.lock().unwrap().push(data);
        Ok(PinnedContent { cid: CID.to_string(), hash: "1220abcd".to_string(), size })
    });
    content_store
}

fn announcer(services: &TestConfigBuilderReturns) -> BatchAnnouncer {
    BatchAnnouncer::new(services.config.clone(), Arc::new(SchemaRegistry::new(services.config.clone())))
}

fn batch_job(from_ids: &[u64]) -> BatchAnnouncerJob {
    BatchAnnouncerJob {
        batch_id: Uuid::new_v4(),
        schema_id: BROADCAST_SCHEMA_ID,
        announcements: from_ids.iter().map(|id| broadcast(*id)).collect(),
    }
}

#[rstest]
#[tokio::test]
async fn batch_is_pinned_as_a_parquet_file_in_row_order(broadcast_schema: SchemaInfo) {
    let pinned = Arc::new(Mutex::new(Vec::new()));
    let services = TestConfigBuilder::new()
        .configure_chain_client(chain_client(broadcast_schema))
        .configure_content_store(content_store(pinned.clone()))
        .build();
    let job = batch_job(&[30, 10, 20]);

    let publisher_job = announcer(&services).announce(&job).await.unwrap();

    let file = pinned.lock().unwrap().pop().unwrap();
    assert_eq!(
        publisher_job,
        PublisherJob {
            id: job.batch_id.to_string(),
            schema_id: BROADCAST_SCHEMA_ID,
            data: PublisherPayload::Ipfs { cid: CID.to_string(), payload_length: file.len() as u64 },
        }
    );

    let reader = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().build().unwrap();
    let batches: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 3);

    let from_ids = batch.column_by_name("fromId").unwrap().as_any().downcast_ref::<UInt64Array>().unwrap();
    assert_eq!(from_ids.values().to_vec(), vec![30, 10, 20]);

    let types = batch.column_by_name("announcementType").unwrap().as_any().downcast_ref::<Int32Array>().unwrap();
    assert!(types.iter().all(|announcement_type| announcement_type == Some(2)));

    let hashes = batch.column_by_name("contentHash").unwrap().as_any().downcast_ref::<BinaryArray>().unwrap();
    assert_eq!(hashes.value(1), b"bciq10");

    let urls = batch.column_by_name("url").unwrap().as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(urls.value(2), "https://example.com/announcements/20");
    assert_eq!(urls.null_count(), 0);
}

#[rstest]
#[tokio::test]
async fn non_parquet_schema_is_rejected(mut broadcast_schema: SchemaInfo) {
    broadcast_schema.model_type = ModelType::AvroBinary;
    let mut content_store = MockContentStore::new();
    content_store.expect_pin().never();
    let services = TestConfigBuilder::new()
        .configure_chain_client(chain_client(broadcast_schema))
        .configure_content_store(content_store)
        .build();

    let error = announcer(&services).announce(&batch_job(&[1])).await.unwrap_err();

    assert_matches!(error, AnnouncerError::UnsupportedModel { schema_id: BROADCAST_SCHEMA_ID, model_type: ModelType::AvroBinary });
    assert!(error.is_permanent());
}

#[rstest]
#[tokio::test]
async fn existing_batch_file_is_announced_by_its_cid() {
    let mut content_store = MockContentStore::new();
    content_store
        .expect_stat()
        .times(1)
        .returning(|cid| Ok(ContentStat { cid: cid.to_string(), size: 2048 }));
    let services = TestConfigBuilder::new().configure_content_store(content_store).build();

    let publisher_job = announcer(&services)
        .announce_existing_batch(&ExistingBatchFile { cid: CID.to_string(), schema_id: BROADCAST_SCHEMA_ID })
        .await
        .unwrap();

    assert_eq!(publisher_job.id, CID);
    assert_eq!(publisher_job.data, PublisherPayload::Ipfs { cid: CID.to_string(), payload_length: 2048 });
}

#[rstest]
#[tokio::test]
async fn processed_batch_is_queued_for_publishing_once(broadcast_schema: SchemaInfo) {
    let pinned = Arc::new(Mutex::new(Vec::new()));
    let services = TestConfigBuilder::new()
        .configure_chain_client(chain_client(broadcast_schema))
        .configure_content_store(content_store(pinned.clone()))
        .build();
    let processor = BatchAnnouncementProcessor::new(services.config.clone(), announcer(&services));

    let batch = BatchQueueJob::New(batch_job(&[1, 2]));
    let job = queued_job(QueueType::BatchAnnouncement, &batch.job_id(), &batch);
    processor.process(&job).await.unwrap();
    // redelivered after a crash before completion
    processor.process(&job).await.unwrap();

    let publish = services.queue.pending_payloads(QueueType::Publish).await;
    assert_eq!(publish.len(), 1);
    let publisher_job: PublisherJob = serde_json::from_str(&publish[&batch.job_id()]).unwrap();
    assert_eq!(publisher_job.id, batch.job_id());
    assert_eq!(publisher_job.schema_id, BROADCAST_SCHEMA_ID);
    assert_eq!(pinned.lock().unwrap().len(), 2);
}
