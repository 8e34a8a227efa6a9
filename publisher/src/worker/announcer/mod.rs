pub mod batch_file;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use publisher_chain_client_interface::ModelType;
use tracing::{debug, info};

use crate::core::client::queue::{enqueue_json, EnqueueOptions, QueuedJob};
use crate::core::client::storage::BATCH_FILE_MIME_TYPE;
use crate::core::config::Config;
use crate::error::job::announcer::AnnouncerError;
use crate::error::job::JobError;
use crate::types::jobs::{BatchAnnouncerJob, BatchQueueJob, ExistingBatchFile, PublisherJob, PublisherPayload};
use crate::types::queue::QueueType;
use crate::worker::controller::JobProcessor;
use crate::worker::schema::SchemaRegistry;
use batch_file::ParquetModel;

/// Turns closed batches into pinned parquet files and the publisher jobs announcing them
pub struct BatchAnnouncer {
    config: Arc<Config>,
    schemas: Arc<SchemaRegistry>,
}

impl BatchAnnouncer {
    pub fn new(config: Arc<Config>, schemas: Arc<SchemaRegistry>) -> Self {
        Self { config, schemas }
    }

    pub async fn announce(&self, job: &BatchAnnouncerJob) -> Result<PublisherJob, AnnouncerError> {
        debug!(batch_id = %job.batch_id, schema_id = job.schema_id, rows = job.announcements.len(), "Announcing batch");

        let schema = self.schemas.schema(job.schema_id).await?;
        if schema.model_type != ModelType::Parquet {
            return Err(AnnouncerError::UnsupportedModel { schema_id: job.schema_id, model_type: schema.model_type });
        }
        let model = ParquetModel::parse(job.schema_id, &schema.model)?;
        let file = model.encode(&job.announcements)?;

        let pinned = self.config.content_store().pin(BATCH_FILE_MIME_TYPE, Bytes::from(file)).await?;
        info!(batch_id = %job.batch_id, cid = %pinned.cid, hash = %pinned.hash, size = pinned.size, "Batch file pinned");

        Ok(PublisherJob {
            id: job.batch_id.to_string(),
            schema_id: job.schema_id,
            data: PublisherPayload::Ipfs { cid: pinned.cid, payload_length: pinned.size },
        })
    }

    /// Publisher job for a batch file that is already pinned
    pub async fn announce_existing_batch(&self, batch: &ExistingBatchFile) -> Result<PublisherJob, AnnouncerError> {
        let stat = self.config.content_store().stat(&batch.cid).await?;
        debug!(cid = %stat.cid, size = stat.size, "Found existing batch file");

        Ok(PublisherJob {
            id: batch.cid.clone(),
            schema_id: batch.schema_id,
            data: PublisherPayload::Ipfs { cid: stat.cid, payload_length: stat.size },
        })
    }
}

/// Consumes the batch queue and forwards the resulting jobs to the publish queue
pub struct BatchAnnouncementProcessor {
    config: Arc<Config>,
    announcer: BatchAnnouncer,
}

impl BatchAnnouncementProcessor {
    pub fn new(config: Arc<Config>, announcer: BatchAnnouncer) -> Self {
        Self { config, announcer }
    }
}

#[async_trait]
impl JobProcessor for BatchAnnouncementProcessor {
    async fn process(&self, job: &QueuedJob) -> Result<(), JobError> {
        let publisher_job = match job.parse_payload::<BatchQueueJob>()? {
            BatchQueueJob::New(batch) => self.announcer.announce(&batch).await?,
            BatchQueueJob::Existing(file) => self.announcer.announce_existing_batch(&file).await?,
        };

        let options =
            EnqueueOptions::for_queue(QueueType::Publish).with_attempts(self.config.settings().publishing.attempts);
        let enqueued =
            enqueue_json(self.config.queue(), QueueType::Publish, &job.id, &publisher_job, Some(options)).await?;
        if enqueued {
            info!(schema_id = publisher_job.schema_id, "Queued batch for publishing");
        } else {
            debug!("Batch already queued for publishing");
        }
        Ok(())
    }
}
