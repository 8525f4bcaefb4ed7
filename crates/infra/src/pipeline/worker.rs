//! Chunk worker: classify one chunk and count it.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use vesselflow_ai::{ChunkRow, Classifier, ModelError, prepare_matrix};
use vesselflow_core::{Applied, JobTransition, PredictionResult, ResultBatch, WorkItem};

use crate::error::{PipelineError, StoreError};
use crate::job_store::JobStore;
use crate::object_store::ObjectStore;
use crate::result_store::ResultStore;

/// Class index used for every vessel of a chunk the model could not classify.
pub const FALLBACK_CLASS: usize = 0;

/// What the queue should do with the delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Batch written and chunk counted (now or by an earlier delivery). Ack.
    Completed,
    /// The job was marked `error`; redelivery cannot help. Ack.
    Failed(String),
    /// Transient failure after the batch was written. Nack for redelivery.
    Retry(String),
    /// Not a work item. Ack and forget.
    Discarded,
}

impl HandlerOutcome {
    pub fn should_ack(&self) -> bool {
        !matches!(self, HandlerOutcome::Retry(_))
    }
}

pub struct ChunkWorker {
    jobs: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    results: Arc<dyn ResultStore>,
    classifier: Arc<dyn Classifier>,
}

impl ChunkWorker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        results: Arc<dyn ResultStore>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            jobs,
            objects,
            results,
            classifier,
        }
    }

    /// Handle one delivered queue message. Safe to call any number of times per chunk.
    pub fn handle(&self, message: &JsonValue) -> HandlerOutcome {
        let item: WorkItem = match WorkItem::deserialize(message) {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, "dropping undecodable work item");
                return HandlerOutcome::Discarded;
            }
        };
        self.process(&item)
    }

    /// Classify and count a decoded work item.
    pub fn process(&self, item: &WorkItem) -> HandlerOutcome {
        let job_id = item.job_id;
        let chunk_index = item.chunk_index;

        let batch = match self.classify_chunk(item) {
            Ok(batch) => batch,
            Err(err) => return self.fail_job(item, err),
        };

        if let Err(e) = self.results.put_batch(&batch) {
            return self.fail_job(item, e.into());
        }

        match self.jobs.record_chunk_processed(job_id, chunk_index) {
            Ok(Applied::Changed) => {
                info!(%job_id, chunk_index, predictions = batch.predictions.len(), "chunk processed");
                HandlerOutcome::Completed
            }
            Ok(Applied::Unchanged) => {
                debug!(%job_id, chunk_index, "redelivered chunk already counted");
                HandlerOutcome::Completed
            }
            Err(e @ (StoreError::Domain(_) | StoreError::JobNotFound(_))) => self.fail_job(item, e.into()),
            Err(e) => {
                warn!(%job_id, chunk_index, error = %e, "could not count chunk, requesting redelivery");
                HandlerOutcome::Retry(e.to_string())
            }
        }
    }

    fn classify_chunk(&self, item: &WorkItem) -> Result<ResultBatch, PipelineError> {
        let bytes = self.objects.get(&item.storage_ref)?;
        let rows: Vec<ChunkRow> = serde_json::from_slice(&bytes).map_err(|e| {
            PipelineError::Infrastructure(format!("chunk {} is not valid JSON: {e}", item.storage_ref))
        })?;

        let prepared = prepare_matrix(&rows, self.classifier.feature_columns());
        if !prepared.missing_columns.is_empty() {
            warn!(
                job_id = %item.job_id,
                chunk_index = item.chunk_index,
                missing = ?prepared.missing_columns,
                "chunk lacks model features, filled with defaults"
            );
        }

        let classified = self
            .classifier
            .classify(&prepared.matrix)
            .and_then(|outputs| {
                if outputs.len() == prepared.vessel_ids.len() {
                    Ok(outputs)
                } else {
                    Err(ModelError::InferenceFailed(format!(
                        "{} outputs for {} rows",
                        outputs.len(),
                        prepared.vessel_ids.len()
                    )))
                }
            });

        let (predictions, fallback): (Vec<PredictionResult>, bool) = match classified {
            Ok(outputs) => (
                prepared
                    .vessel_ids
                    .iter()
                    .zip(&outputs)
                    .map(|(mmsi, out)| {
                        PredictionResult::new(mmsi.as_str(), out.class_index, out.probabilities.as_deref())
                    })
                    .collect(),
                false,
            ),
            Err(e) => {
                warn!(
                    job_id = %item.job_id,
                    chunk_index = item.chunk_index,
                    model = self.classifier.name(),
                    error = %e,
                    "classification failed, using fallback class"
                );
                (
                    prepared
                        .vessel_ids
                        .iter()
                        .map(|mmsi| PredictionResult::new(mmsi.as_str(), FALLBACK_CLASS, None))
                        .collect(),
                    true,
                )
            }
        };

        Ok(ResultBatch {
            job_id: item.job_id,
            chunk_index: item.chunk_index,
            predictions,
            chunk_size: rows.len(),
            fallback,
            processed_at: Utc::now(),
        })
    }

    fn fail_job(&self, item: &WorkItem, err: PipelineError) -> HandlerOutcome {
        let message = format!("chunk {} failed: {err}", item.chunk_index);
        error!(job_id = %item.job_id, chunk_index = item.chunk_index, error = %err, "chunk failed");

        match self.jobs.apply(item.job_id, &JobTransition::Fail { message: message.clone() }) {
            Ok(_) | Err(StoreError::JobNotFound(_)) => HandlerOutcome::Failed(message),
            Err(e) => {
                warn!(job_id = %item.job_id, error = %e, "could not mark job as failed, requesting redelivery");
                HandlerOutcome::Retry(e.to_string())
            }
        }
    }
}
