use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use vesselflow_core::{JobId, ResultBatch};

use super::ResultStore;
use crate::error::StoreError;

/// In-memory result store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    batches: RwLock<HashMap<JobId, BTreeMap<u32, ResultBatch>>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl ResultStore for InMemoryResultStore {
    fn put_batch(&self, batch: &ResultBatch) -> Result<(), StoreError> {
        let mut batches = self
            .batches
            .write()
            .map_err(|_| StoreError::storage("result store lock poisoned"))?;
        batches
            .entry(batch.job_id)
            .or_default()
            .insert(batch.chunk_index, batch.clone());
        Ok(())
    }

    fn list_batches(&self, job_id: JobId) -> Result<Vec<ResultBatch>, StoreError> {
        let batches = self
            .batches
            .read()
            .map_err(|_| StoreError::storage("result store lock poisoned"))?;
        Ok(batches
            .get(&job_id)
            .map(|by_chunk| by_chunk.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vesselflow_core::PredictionResult;

    fn batch(job_id: JobId, chunk_index: u32, mmsi: &str) -> ResultBatch {
        ResultBatch {
            job_id,
            chunk_index,
            predictions: vec![PredictionResult::new(mmsi, 1, None)],
            chunk_size: 1,
            fallback: false,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn rewriting_a_chunk_keeps_one_batch() {
        let store = InMemoryResultStore::new();
        let job = JobId::new();

        store.put_batch(&batch(job, 0, "first")).unwrap();
        store.put_batch(&batch(job, 0, "retry")).unwrap();

        let batches = store.list_batches(job).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].predictions[0].mmsi, "retry");
    }

    #[test]
    fn batches_are_listed_by_chunk_index_per_job() {
        let store = InMemoryResultStore::new();
        let job = JobId::new();
        let other = JobId::new();

        store.put_batch(&batch(job, 2, "c")).unwrap();
        store.put_batch(&batch(job, 0, "a")).unwrap();
        store.put_batch(&batch(other, 0, "x")).unwrap();

        let indices: Vec<u32> = store
            .list_batches(job)
            .unwrap()
            .iter()
            .map(|b| b.chunk_index)
            .collect();
        assert_eq!(indices, vec![0, 2]);
        assert!(store.list_batches(JobId::new()).unwrap().is_empty());
    }
}
