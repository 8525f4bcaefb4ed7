//! `vesselflow-infra`: storage adapters, pipeline stages and worker threads.
//!
//! Backends: in-memory (tests/dev) for every collaborator, a filesystem object store,
//! and Redis job/result stores plus a Redis Streams work queue behind the `redis` feature.

pub mod config;
pub mod error;
pub mod job_store;
pub mod object_store;
pub mod pipeline;
pub mod queue;
pub mod result_store;
pub mod workers;


pub use config::PipelineConfig;
pub use error::{ConfigError, IngestError, PipelineError, StoreError};
pub use job_store::{InMemoryJobStore, JobStore};
pub use object_store::{FsObjectStore, InMemoryObjectStore, ObjectStore};
pub use pipeline::{
    ChunkSplitter, ChunkWorker, Collaborators, CompletionDetector, HandlerOutcome, IngestService,
    JobReport, JobSummary, Pipeline, PipelineRuntime, ResultAggregator,
};
pub use result_store::{InMemoryResultStore, ResultStore};
pub use workers::{ChunkWorkerPool, CompletionWatcher, WorkerHandle};
