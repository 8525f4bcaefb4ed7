//! Store and pipeline error taxonomy.

use thiserror::Error;

use vesselflow_ai::ModelError;
use vesselflow_core::{DomainError, JobId};
use vesselflow_events::QueueError;
use vesselflow_features::FeatureError;

/// Failure of a persistence collaborator (object store, job store, result store).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    /// The job state machine rejected the change.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn storage(msg: impl ToString) -> Self {
        Self::Storage(msg.to_string())
    }

    pub fn serialization(msg: impl ToString) -> Self {
        Self::Serialization(msg.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

/// Pipeline-level error, grouped by how callers react to it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// Malformed or out-of-range input. Surfaced immediately, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// A storage, queue or document-store collaborator is unavailable.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// The classifier failed. Recovered per chunk.
    #[error("model error: {0}")]
    Model(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<FeatureError> for PipelineError {
    fn from(value: FeatureError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<ModelError> for PipelineError {
    fn from(value: ModelError) -> Self {
        Self::Model(value.to_string())
    }
}

impl From<QueueError> for PipelineError {
    fn from(value: QueueError) -> Self {
        Self::Infrastructure(value.to_string())
    }
}

impl From<StoreError> for PipelineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::JobNotFound(_) | StoreError::ObjectNotFound(_) => {
                Self::NotFound(value.to_string())
            }
            StoreError::Domain(DomainError::Validation(_) | DomainError::InvalidId(_)) => {
                Self::Validation(value.to_string())
            }
            other => Self::Infrastructure(other.to_string()),
        }
    }
}

/// Ingestion failure, with the id of the job left in `error` when one was created.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{error}")]
pub struct IngestError {
    pub job_id: Option<JobId>,
    #[source]
    pub error: PipelineError,
}

impl IngestError {
    pub fn for_job(job_id: JobId, error: PipelineError) -> Self {
        Self {
            job_id: Some(job_id),
            error,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.error.is_validation()
    }
}

impl From<PipelineError> for IngestError {
    fn from(error: PipelineError) -> Self {
        Self { job_id: None, error }
    }
}

impl From<StoreError> for IngestError {
    fn from(value: StoreError) -> Self {
        PipelineError::from(value).into()
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {key}: {message}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub message: String,
}
