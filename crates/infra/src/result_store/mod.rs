//! Per-chunk result batches, keyed by `(job_id, chunk_index)`.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_store;

use std::sync::Arc;

use vesselflow_core::{JobId, ResultBatch};

use crate::error::StoreError;

pub use in_memory::InMemoryResultStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisResultStore;

pub trait ResultStore: Send + Sync {
    /// Store the batch for its chunk, replacing a batch written by an earlier attempt.
    fn put_batch(&self, batch: &ResultBatch) -> Result<(), StoreError>;

    /// Every batch written for `job_id`, ordered by chunk index.
    fn list_batches(&self, job_id: JobId) -> Result<Vec<ResultBatch>, StoreError>;
}

impl<T> ResultStore for Arc<T>
where
    T: ResultStore + ?Sized,
{
    fn put_batch(&self, batch: &ResultBatch) -> Result<(), StoreError> {
        (**self).put_batch(batch)
    }

    fn list_batches(&self, job_id: JobId) -> Result<Vec<ResultBatch>, StoreError> {
        (**self).list_batches(job_id)
    }
}
