//! Chunk splitter: fan a job's feature vectors out into work items.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, info};

use vesselflow_core::{JobId, JobTransition, WorkItem};
use vesselflow_events::WorkQueue;
use vesselflow_features::FeatureVector;

use crate::error::PipelineError;
use crate::job_store::JobStore;
use crate::object_store::ObjectStore;

/// Number of chunks `len` vectors produce at `chunk_size` per chunk.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size.max(1))
}

/// Object path of chunk `chunk_index` of `job_id`.
pub fn chunk_path(chunks_prefix: &str, job_id: JobId, chunk_index: u32) -> String {
    format!("{chunks_prefix}{job_id}/{chunk_index}.json")
}

/// What the splitter produced for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSummary {
    pub chunk_count: u32,
    pub vessel_count: u32,
}

pub struct ChunkSplitter {
    jobs: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    queue: Arc<dyn WorkQueue<JsonValue>>,
    chunk_size: usize,
    topic: String,
    chunks_prefix: String,
}

impl ChunkSplitter {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        queue: Arc<dyn WorkQueue<JsonValue>>,
        chunk_size: usize,
        topic: impl Into<String>,
        chunks_prefix: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            objects,
            queue,
            chunk_size: chunk_size.max(1),
            topic: topic.into(),
            chunks_prefix: chunks_prefix.into(),
        }
    }

    /// Persist and enqueue every chunk of `vectors`, then move the job to `processing`.
    ///
    /// Each work item is published only after its payload is durable, and the chunk count
    /// is recorded only after every work item is out. The first failure stops the split;
    /// marking the job as failed is left to the caller.
    pub fn split(&self, job_id: JobId, vectors: &[FeatureVector]) -> Result<SplitSummary, PipelineError> {
        if vectors.is_empty() {
            return Err(PipelineError::Validation("no feature vectors to split".into()));
        }

        let vessel_count = u32::try_from(vectors.len())
            .map_err(|_| PipelineError::Validation("too many vessels in one upload".into()))?;

        let mut produced: u32 = 0;
        for (chunk_index, chunk) in (0u32..).zip(vectors.chunks(self.chunk_size)) {
            let payload = serde_json::to_vec(chunk)
                .map_err(|e| PipelineError::Infrastructure(format!("chunk encoding failed: {e}")))?;
            let storage_ref = self
                .objects
                .put(&chunk_path(&self.chunks_prefix, job_id, chunk_index), payload)?;

            let item = WorkItem {
                job_id,
                chunk_index,
                storage_ref,
            };
            let message = serde_json::to_value(&item)
                .map_err(|e| PipelineError::Infrastructure(format!("work item encoding failed: {e}")))?;
            self.queue.publish(&self.topic, message)?;

            debug!(%job_id, chunk_index, vessels = chunk.len(), "chunk enqueued");
            produced += 1;
        }

        self.jobs.apply(
            job_id,
            &JobTransition::SplitCompleted {
                chunk_count: produced,
                vessel_count,
            },
        )?;

        info!(%job_id, chunks = produced, vessels = vessel_count, "job split into chunks");
        Ok(SplitSummary {
            chunk_count: produced,
            vessel_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesselflow_core::{Job, JobStatus, ObjectRef};
    use vesselflow_events::InMemoryWorkQueue;
    use vesselflow_features::FEATURE_COUNT;

    use crate::job_store::InMemoryJobStore;
    use crate::object_store::InMemoryObjectStore;

    fn vectors(n: usize) -> Vec<FeatureVector> {
        (0..n)
            .map(|i| FeatureVector::new(format!("{}", 200_000_000 + i), [i as f64; FEATURE_COUNT]))
            .collect()
    }

    fn splitting_job(jobs: &InMemoryJobStore) -> JobId {
        let job = jobs.create(Job::new("uploads/ais.csv")).unwrap();
        for to in [JobStatus::Preprocessing, JobStatus::Splitting] {
            jobs.apply(job.id, &JobTransition::Advance { to }).unwrap();
        }
        job.id
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(0, 100), 0);
        assert_eq!(chunk_count(100, 100), 1);
        assert_eq!(chunk_count(101, 100), 2);
        assert_eq!(chunk_count(250, 100), 3);
    }

    #[test]
    fn chunks_are_persisted_enqueued_and_counted() {
        let jobs = InMemoryJobStore::arc();
        let objects = InMemoryObjectStore::arc();
        let queue = Arc::new(InMemoryWorkQueue::<JsonValue>::new());
        let sub = queue.subscribe("process-chunk");
        let splitter = ChunkSplitter::new(
            jobs.clone(),
            objects.clone(),
            queue.clone(),
            2,
            "process-chunk",
            "chunks/",
        );
        let job_id = splitting_job(&jobs);

        let summary = splitter.split(job_id, &vectors(5)).unwrap();
        assert_eq!(summary, SplitSummary { chunk_count: 3, vessel_count: 5 });

        let items: Vec<WorkItem> = std::iter::from_fn(|| sub.try_recv().ok())
            .map(|d| serde_json::from_value(d.payload).unwrap())
            .collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].storage_ref, ObjectRef::new(format!("chunks/{job_id}/2.json")));

        let last: Vec<JsonValue> =
            serde_json::from_slice(&objects.get(&items[2].storage_ref).unwrap()).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0]["mmsi"], "200000004");

        let job = jobs.get(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.chunk_count, Some(3));
        assert_eq!(job.vessel_count, Some(5));
    }

    #[test]
    fn empty_input_is_rejected() {
        let jobs = InMemoryJobStore::arc();
        let splitter = ChunkSplitter::new(
            jobs.clone(),
            InMemoryObjectStore::arc(),
            Arc::new(InMemoryWorkQueue::<JsonValue>::new()),
            100,
            "process-chunk",
            "chunks/",
        );
        let job_id = splitting_job(&jobs);

        assert!(splitter.split(job_id, &[]).unwrap_err().is_validation());
        assert_eq!(jobs.get(job_id).unwrap().unwrap().chunk_count, None);
    }
}
