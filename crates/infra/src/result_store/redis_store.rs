//! Redis-backed result store (optional).
//!
//! One hash per job, `vesselflow:results:{job_id}`, field = chunk index, value = batch JSON.
//! `HSET` overwrites, which gives "at most one batch per chunk" for free.

use std::collections::HashMap;

use redis::Commands;
use tracing::instrument;

use vesselflow_core::{JobId, ResultBatch};

use super::ResultStore;
use crate::error::StoreError;

const KEY_PREFIX: &str = "vesselflow:results";

#[derive(Debug, Clone)]
pub struct RedisResultStore {
    client: redis::Client,
}

impl RedisResultStore {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(StoreError::storage)?;
        Ok(Self { client })
    }

    fn key(job_id: JobId) -> String {
        format!("{KEY_PREFIX}:{job_id}")
    }
}

impl ResultStore for RedisResultStore {
    #[instrument(skip(self, batch), fields(job_id = %batch.job_id, chunk_index = batch.chunk_index), err)]
    fn put_batch(&self, batch: &ResultBatch) -> Result<(), StoreError> {
        let doc = serde_json::to_string(batch)?;
        let mut conn = self.client.get_connection().map_err(StoreError::storage)?;
        let _: i64 = conn
            .hset(Self::key(batch.job_id), batch.chunk_index, doc)
            .map_err(StoreError::storage)?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    fn list_batches(&self, job_id: JobId) -> Result<Vec<ResultBatch>, StoreError> {
        let mut conn = self.client.get_connection().map_err(StoreError::storage)?;
        let raw: HashMap<u32, String> = conn.hgetall(Self::key(job_id)).map_err(StoreError::storage)?;

        let mut batches = raw
            .values()
            .map(|doc| serde_json::from_str::<ResultBatch>(doc))
            .collect::<Result<Vec<_>, _>>()?;
        batches.sort_by_key(|b| b.chunk_index);
        Ok(batches)
    }
}
