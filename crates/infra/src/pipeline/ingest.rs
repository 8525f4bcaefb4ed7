//! Ingestion trigger: an object landed in storage, start a job for it.

use std::sync::Arc;

use tracing::{error, info, warn};

use vesselflow_core::{Job, JobId, JobStatus, JobTransition, ObjectRef};

use super::splitter::ChunkSplitter;
use crate::error::{IngestError, PipelineError};
use crate::job_store::JobStore;
use crate::object_store::ObjectStore;

pub struct IngestService {
    jobs: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    splitter: ChunkSplitter,
    uploads_prefix: String,
}

impl IngestService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        splitter: ChunkSplitter,
        uploads_prefix: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            objects,
            splitter,
            uploads_prefix: uploads_prefix.into(),
        }
    }

    /// Store `bytes` as an upload and run the ingestion trigger on it.
    pub fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<Option<JobId>, IngestError> {
        if matches!(file_name, "" | "." | "..") || file_name.contains('/') {
            return Err(PipelineError::Validation(format!("invalid file name {file_name:?}")).into());
        }
        let object = self
            .objects
            .put(&format!("{}{file_name}", self.uploads_prefix), bytes)?;
        self.on_object_finalized(object.path())
    }

    /// React to a finalized object.
    ///
    /// Objects outside the uploads prefix are ignored (`Ok(None)`). Otherwise a job is
    /// created and driven through preprocessing and splitting. On failure the job is
    /// left in `error` with the failure message, and the error carries its id.
    pub fn on_object_finalized(&self, path: &str) -> Result<Option<JobId>, IngestError> {
        if !path.starts_with(&self.uploads_prefix) {
            info!(path, "ignoring object outside the uploads prefix");
            return Ok(None);
        }

        let job = self.jobs.create(Job::new(path))?;
        info!(job_id = %job.id, path, "job created");

        match self.run(&job) {
            Ok(()) => Ok(Some(job.id)),
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "ingestion failed");
                let failed = self.jobs.apply(
                    job.id,
                    &JobTransition::Fail {
                        message: err.to_string(),
                    },
                );
                if let Err(mark_err) = failed {
                    error!(job_id = %job.id, error = %mark_err, "could not mark job as failed");
                }
                Err(IngestError::for_job(job.id, err))
            }
        }
    }

    fn run(&self, job: &Job) -> Result<(), PipelineError> {
        let bytes = self.objects.get(&ObjectRef::new(job.source_file.as_str()))?;

        self.advance(job.id, JobStatus::Preprocessing)?;
        let vectors = vesselflow_features::preprocess(&bytes)?;

        self.advance(job.id, JobStatus::Splitting)?;
        self.splitter.split(job.id, &vectors)?;
        Ok(())
    }

    fn advance(&self, job_id: JobId, to: JobStatus) -> Result<(), PipelineError> {
        self.jobs.apply(job_id, &JobTransition::Advance { to })?;
        info!(%job_id, status = %to, "job advanced");
        Ok(())
    }
}
