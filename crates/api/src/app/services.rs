//! Pipeline wiring shared by the handlers and the binary.

use std::sync::Arc;

use anyhow::Context;

use vesselflow_ai::Classifier;
use vesselflow_core::JobId;
use vesselflow_infra::{
    Collaborators, FsObjectStore, IngestError, JobReport, JobSummary, Pipeline, PipelineConfig, PipelineError,
};

#[derive(Clone)]
pub struct AppServices {
    pipeline: Arc<Pipeline>,
}

impl AppServices {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Store the upload and run the ingestion trigger on a blocking thread.
    ///
    /// Returns once the job is split and its chunks are queued.
    pub async fn upload(&self, file_name: String, body: Vec<u8>) -> Result<JobId, IngestError> {
        let pipeline = Arc::clone(&self.pipeline);
        let name = file_name.clone();
        let ingested = tokio::task::spawn_blocking(move || pipeline.ingest.upload(&name, body))
            .await
            .map_err(|e| PipelineError::Infrastructure(format!("ingestion task failed: {e}")))??;

        ingested.ok_or_else(|| {
            PipelineError::Infrastructure(format!("upload {file_name:?} was not ingested")).into()
        })
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, PipelineError> {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || pipeline.aggregator.list_jobs())
            .await
            .map_err(|e| PipelineError::Infrastructure(format!("query task failed: {e}")))?
    }

    pub async fn job_results(&self, job_id: JobId) -> Result<JobReport, PipelineError> {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || pipeline.aggregator.job_results(job_id))
            .await
            .map_err(|e| PipelineError::Infrastructure(format!("query task failed: {e}")))?
    }
}

/// Pick the collaborators for this process.
///
/// Redis backs jobs, results and the queue when a URL is configured and the `redis`
/// feature is compiled in; otherwise everything but the object store stays in memory.
pub fn build_collaborators(config: &PipelineConfig, classifier: Arc<dyn Classifier>) -> anyhow::Result<Collaborators> {
    if let Some(url) = config.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        {
            return build_redis_collaborators(url, config, classifier);
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(redis_url = url, "redis feature not enabled, falling back to in-memory stores");
        }
    }

    let mut collaborators = Collaborators::in_memory(config, classifier);
    collaborators.objects = Arc::new(open_object_store(config)?);
    tracing::info!(data_dir = %config.data_dir.display(), "using in-memory stores with filesystem objects");
    Ok(collaborators)
}

#[cfg(feature = "redis")]
fn build_redis_collaborators(
    url: &str,
    config: &PipelineConfig,
    classifier: Arc<dyn Classifier>,
) -> anyhow::Result<Collaborators> {
    use vesselflow_infra::job_store::RedisJobStore;
    use vesselflow_infra::queue::RedisStreamsWorkQueue;
    use vesselflow_infra::result_store::RedisResultStore;

    let collaborators = Collaborators {
        jobs: Arc::new(RedisJobStore::new(url).context("connecting redis job store")?),
        objects: Arc::new(open_object_store(config)?),
        results: Arc::new(RedisResultStore::new(url).context("connecting redis result store")?),
        queue: Arc::new(
            RedisStreamsWorkQueue::new(url, config.redelivery_policy())
                .context("connecting redis work queue")?
                .with_pending_timeout(config.queue_pending_timeout()),
        ),
        classifier,
    };
    tracing::info!(data_dir = %config.data_dir.display(), "using redis stores");
    Ok(collaborators)
}

fn open_object_store(config: &PipelineConfig) -> anyhow::Result<FsObjectStore> {
    FsObjectStore::open(config.data_dir.clone())
        .with_context(|| format!("opening object store at {}", config.data_dir.display()))
}
