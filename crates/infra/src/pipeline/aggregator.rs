//! Result aggregation for the job query surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use vesselflow_core::{Job, JobId, JobStatus, PredictionResult};

use crate::error::PipelineError;
use crate::job_store::JobStore;
use crate::result_store::ResultStore;

/// Everything known about a job right now: status, progress and every prediction
/// persisted so far. Unfinished and errored jobs report their partial results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub file_name: String,
    pub vessel_count: Option<u32>,
    /// Class name -> number of vessels predicted as that class.
    #[serde(rename = "classificationSummary")]
    pub class_summary: BTreeMap<String, usize>,
    pub predictions: Vec<PredictionResult>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processed_chunks: u32,
    pub chunk_count: Option<u32>,
    pub error: Option<String>,
}

/// One row of the job listing: status and progress, no predictions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub file_name: String,
    pub vessel_count: Option<u32>,
    pub processed_chunks: u32,
    pub chunk_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            file_name: job.file_name().to_string(),
            status: job.status,
            vessel_count: job.vessel_count,
            processed_chunks: job.processed_chunks,
            chunk_count: job.chunk_count,
            created_at: job.created_at,
            completed_at: job.completed_at,
            error: job.error,
        }
    }
}

/// Count predictions per class name.
pub fn class_histogram<'a>(
    predictions: impl IntoIterator<Item = &'a PredictionResult>,
) -> BTreeMap<String, usize> {
    let mut summary = BTreeMap::new();
    for p in predictions {
        *summary.entry(p.class_name.as_str().to_string()).or_insert(0) += 1;
    }
    summary
}

pub struct ResultAggregator {
    jobs: Arc<dyn JobStore>,
    results: Arc<dyn ResultStore>,
}

impl ResultAggregator {
    pub fn new(jobs: Arc<dyn JobStore>, results: Arc<dyn ResultStore>) -> Self {
        Self { jobs, results }
    }

    /// Every job, newest first.
    pub fn list_jobs(&self) -> Result<Vec<JobSummary>, PipelineError> {
        Ok(self.jobs.list()?.into_iter().map(JobSummary::from).collect())
    }

    pub fn job_results(&self, job_id: JobId) -> Result<JobReport, PipelineError> {
        let job = self
            .jobs
            .get(job_id)?
            .ok_or_else(|| PipelineError::NotFound(format!("job {job_id}")))?;

        let predictions: Vec<PredictionResult> = self
            .results
            .list_batches(job_id)?
            .into_iter()
            .flat_map(|batch| batch.predictions)
            .collect();

        Ok(JobReport {
            job_id,
            status: job.status,
            file_name: job.file_name().to_string(),
            vessel_count: job.vessel_count,
            class_summary: class_histogram(&predictions),
            predictions,
            created_at: job.created_at,
            completed_at: job.completed_at,
            processed_chunks: job.processed_chunks,
            chunk_count: job.chunk_count,
            error: job.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesselflow_core::{JobTransition, ResultBatch, VesselClass};

    use crate::job_store::InMemoryJobStore;
    use crate::result_store::InMemoryResultStore;

    fn batch(job_id: JobId, chunk_index: u32, classes: &[usize]) -> ResultBatch {
        ResultBatch {
            job_id,
            chunk_index,
            predictions: classes
                .iter()
                .enumerate()
                .map(|(i, c)| PredictionResult::new(format!("{chunk_index}-{i}"), *c, None))
                .collect(),
            chunk_size: classes.len(),
            fallback: false,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn merges_batches_and_counts_classes() {
        let jobs = InMemoryJobStore::arc();
        let results = InMemoryResultStore::arc();
        let aggregator = ResultAggregator::new(jobs.clone(), results.clone());
        let job = jobs.create(Job::new("uploads/harbour.csv")).unwrap();

        results.put_batch(&batch(job.id, 1, &[3, 3])).unwrap();
        results.put_batch(&batch(job.id, 0, &[0, 1, 7])).unwrap();

        let report = aggregator.job_results(job.id).unwrap();
        assert_eq!(report.file_name, "harbour.csv");
        assert_eq!(report.predictions.len(), 5);
        assert_eq!(report.class_summary["CARGO"], 2);
        assert_eq!(report.class_summary["TUG"], 1);
        assert_eq!(report.class_summary["FISHING"], 1);
        assert_eq!(report.class_summary["UNKNOWN"], 1);
        assert_eq!(report.predictions[3].class_name, VesselClass::Cargo);
    }

    #[test]
    fn report_uses_query_wire_names() {
        let jobs = InMemoryJobStore::arc();
        let aggregator = ResultAggregator::new(jobs.clone(), InMemoryResultStore::arc());
        let job = jobs.create(Job::new("uploads/a.csv")).unwrap();

        let json = serde_json::to_value(aggregator.job_results(job.id).unwrap()).unwrap();
        assert_eq!(json["status"], "validating");
        assert_eq!(json["fileName"], "a.csv");
        assert!(json["classificationSummary"].as_object().unwrap().is_empty());
        assert!(json["chunkCount"].is_null());
        assert_eq!(json["processedChunks"], 0);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let aggregator = ResultAggregator::new(InMemoryJobStore::arc(), InMemoryResultStore::arc());
        assert!(matches!(
            aggregator.job_results(JobId::new()),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn listing_includes_errored_jobs_with_their_message() {
        let jobs = InMemoryJobStore::arc();
        let aggregator = ResultAggregator::new(jobs.clone(), InMemoryResultStore::arc());
        let job = jobs.create(Job::new("uploads/broken.csv")).unwrap();
        jobs.apply(job.id, &JobTransition::Fail { message: "validation error: empty file".into() })
            .unwrap();

        let listed = aggregator.list_jobs().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].job_id, job.id);
        assert_eq!(listed[0].file_name, "broken.csv");

        let json = serde_json::to_value(&listed[0]).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "validation error: empty file");
        assert!(json.get("predictions").is_none());
    }
}
