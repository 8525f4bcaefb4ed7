//! Job document store.
//!
//! The job document is the only mutable state shared by workers. Every mutation goes
//! through one of the store's atomic primitives; callers never read-modify-write it:
//!
//! - [`JobStore::apply`] applies a state-machine transition against the current document
//! - [`JobStore::record_chunk_processed`] sets the per-chunk marker and increments
//!   `processed_chunks` in one step, so redelivered chunks are counted once
//!
//! Every change is broadcast to [`JobStore::subscribe`]rs (the completion trigger).

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_store;

use std::sync::Arc;

use vesselflow_core::{Applied, Job, JobId, JobTransition};
use vesselflow_events::Subscription;

use crate::error::StoreError;

pub use in_memory::InMemoryJobStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisJobStore;

pub trait JobStore: Send + Sync {
    /// Persist a new job document.
    fn create(&self, job: Job) -> Result<Job, StoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError>;

    /// Apply `transition` atomically against the stored document.
    fn apply(&self, job_id: JobId, transition: &JobTransition) -> Result<Applied, StoreError>;

    /// Count chunk `chunk_index` as processed, once.
    ///
    /// Returns `Unchanged` when the chunk was already counted (redelivery).
    fn record_chunk_processed(&self, job_id: JobId, chunk_index: u32) -> Result<Applied, StoreError>;

    /// Every job document, newest first.
    fn list(&self) -> Result<Vec<Job>, StoreError>;

    /// Receive a snapshot of every job document after each change.
    ///
    /// Delivery is best effort: a backend may drop changes while reconnecting.
    fn subscribe(&self) -> Subscription<Job>;
}

impl<T> JobStore for Arc<T>
where
    T: JobStore + ?Sized,
{
    fn create(&self, job: Job) -> Result<Job, StoreError> {
        (**self).create(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).get(job_id)
    }

    fn apply(&self, job_id: JobId, transition: &JobTransition) -> Result<Applied, StoreError> {
        (**self).apply(job_id, transition)
    }

    fn record_chunk_processed(&self, job_id: JobId, chunk_index: u32) -> Result<Applied, StoreError> {
        (**self).record_chunk_processed(job_id, chunk_index)
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        (**self).list()
    }

    fn subscribe(&self) -> Subscription<Job> {
        (**self).subscribe()
    }
}
