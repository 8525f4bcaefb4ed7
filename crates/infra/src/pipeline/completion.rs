//! Completion detector: finalize a job once every chunk is counted.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use vesselflow_core::{Applied, Job, JobId, JobStatus, JobTransition};

use crate::error::PipelineError;
use crate::job_store::JobStore;

pub struct CompletionDetector {
    jobs: Arc<dyn JobStore>,
}

impl CompletionDetector {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    /// React to a job document change.
    ///
    /// `job` is only a hint: the store re-checks readiness atomically, so stale or
    /// duplicated notifications are harmless.
    pub fn on_job_changed(&self, job: &Job) -> Result<Applied, PipelineError> {
        if !job.is_ready_to_complete() {
            return Ok(Applied::Unchanged);
        }
        self.finalize(job.id)
    }

    /// Look the job up and finalize it if it is ready.
    pub fn check(&self, job_id: JobId) -> Result<Applied, PipelineError> {
        match self.jobs.get(job_id)? {
            Some(job) => self.on_job_changed(&job),
            None => Err(PipelineError::NotFound(format!("job {job_id}"))),
        }
    }

    /// Re-check every job still in `processing`; returns how many were finalized.
    ///
    /// Covers change notifications the store failed to deliver.
    pub fn sweep(&self) -> Result<usize, PipelineError> {
        let mut finalized = 0;
        for job in self.jobs.list()? {
            if job.status != JobStatus::Processing {
                continue;
            }
            match self.on_job_changed(&job) {
                Ok(applied) if applied.changed() => finalized += 1,
                Ok(_) => {}
                Err(err) => warn!(job_id = %job.id, error = %err, "sweep could not finalize job"),
            }
        }
        Ok(finalized)
    }

    fn finalize(&self, job_id: JobId) -> Result<Applied, PipelineError> {
        let applied = self
            .jobs
            .apply(job_id, &JobTransition::Complete { at: Utc::now() })?;
        if applied.changed() {
            info!(%job_id, "job completed");
        }
        Ok(applied)
    }
}
