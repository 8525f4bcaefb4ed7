//! The chunked classification pipeline.
//!
//! ```text
//! upload -> IngestService -> ChunkSplitter --(work items)--> ChunkWorker x N
//!                                                               |
//!            ResultAggregator <-- results      job changes --> CompletionDetector
//! ```
//!
//! Every stage is safe under at-least-once, unordered delivery: the splitter publishes
//! only durable chunks, workers overwrite their batch and count through the job store's
//! atomic marker, and the detector finalizes through an idempotent transition.

pub mod aggregator;
pub mod completion;
pub mod ingest;
pub mod splitter;
pub mod worker;

use std::sync::Arc;

use serde_json::Value as JsonValue;

use vesselflow_ai::Classifier;
use vesselflow_events::{InMemoryWorkQueue, WorkQueue};

use crate::config::PipelineConfig;
use crate::job_store::{InMemoryJobStore, JobStore};
use crate::object_store::{InMemoryObjectStore, ObjectStore};
use crate::result_store::{InMemoryResultStore, ResultStore};
use crate::workers::{ChunkWorkerPool, CompletionWatcher, WorkerHandle};

pub use aggregator::{JobReport, JobSummary, ResultAggregator, class_histogram};
pub use completion::CompletionDetector;
pub use ingest::IngestService;
pub use splitter::{ChunkSplitter, SplitSummary, chunk_count, chunk_path};
pub use worker::{ChunkWorker, FALLBACK_CLASS, HandlerOutcome};

/// The external collaborators, built once at startup and shared by every stage.
#[derive(Clone)]
pub struct Collaborators {
    pub jobs: Arc<dyn JobStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub results: Arc<dyn ResultStore>,
    pub queue: Arc<dyn WorkQueue<JsonValue>>,
    pub classifier: Arc<dyn Classifier>,
}

impl Collaborators {
    /// Process-local collaborators for tests/dev.
    pub fn in_memory(config: &PipelineConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            jobs: InMemoryJobStore::arc(),
            objects: InMemoryObjectStore::arc(),
            results: InMemoryResultStore::arc(),
            queue: Arc::new(InMemoryWorkQueue::<JsonValue>::new().with_policy(config.redelivery_policy())),
            classifier,
        }
    }
}

/// The wired pipeline stages.
pub struct Pipeline {
    pub ingest: Arc<IngestService>,
    pub worker: Arc<ChunkWorker>,
    pub detector: Arc<CompletionDetector>,
    pub aggregator: Arc<ResultAggregator>,
    collaborators: Collaborators,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, config: PipelineConfig) -> Self {
        let Collaborators {
            jobs,
            objects,
            results,
            queue,
            classifier,
        } = collaborators.clone();

        let splitter = ChunkSplitter::new(
            Arc::clone(&jobs),
            Arc::clone(&objects),
            queue,
            config.chunk_size,
            config.topic.clone(),
            config.chunks_prefix.clone(),
        );

        Self {
            ingest: Arc::new(IngestService::new(
                Arc::clone(&jobs),
                Arc::clone(&objects),
                splitter,
                config.uploads_prefix.clone(),
            )),
            worker: Arc::new(ChunkWorker::new(
                Arc::clone(&jobs),
                objects,
                Arc::clone(&results),
                classifier,
            )),
            detector: Arc::new(CompletionDetector::new(Arc::clone(&jobs))),
            aggregator: Arc::new(ResultAggregator::new(jobs, results)),
            collaborators,
            config,
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start the chunk worker pool and the completion watcher.
    pub fn start(&self) -> std::io::Result<PipelineRuntime> {
        // Watch first so no job change between the two spawns goes unseen.
        let watcher = CompletionWatcher::spawn(
            &*self.collaborators.jobs,
            Arc::clone(&self.detector),
            self.config.completion_sweep_interval(),
        )?;
        let pool = ChunkWorkerPool::spawn(
            self.config.workers,
            Arc::clone(&self.collaborators.queue),
            &self.config.topic,
            Arc::clone(&self.worker),
        )?;
        Ok(PipelineRuntime { pool, watcher })
    }
}

/// Running background threads of a [`Pipeline`].
#[derive(Debug)]
pub struct PipelineRuntime {
    pool: ChunkWorkerPool,
    watcher: WorkerHandle,
}

impl PipelineRuntime {
    pub fn workers(&self) -> usize {
        self.pool.len()
    }

    pub fn shutdown(self) {
        self.pool.shutdown();
        self.watcher.shutdown();
    }
}
