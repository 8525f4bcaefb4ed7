//! Redis-backed job store (optional).
//!
//! Layout per job:
//! - `vesselflow:job:{id}` hash: `doc` (JSON job document) and `processed` (counter)
//! - `vesselflow:job:{id}:chunks` set: chunk indices already counted
//! - `vesselflow:jobs:index` sorted set: every job id, scored by creation time
//!
//! Transitions run as WATCH/MULTI transactions over the hash. The chunk counter is
//! only ever touched by a Lua script that adds the marker and increments in one step.
//! Changes are announced on the `vesselflow:jobs` pub/sub channel (job id payload).
//! The subscription reconnects after Redis failures; pub/sub does not replay what was
//! published in between, so consumers must not rely on seeing every change.

use std::str::FromStr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use redis::Commands;
use tracing::{debug, error, info, instrument, warn};

use vesselflow_core::{Applied, Job, JobId, JobTransition};
use vesselflow_events::Subscription;

use super::JobStore;
use crate::error::StoreError;

const KEY_PREFIX: &str = "vesselflow:job";
const CHANGES_CHANNEL: &str = "vesselflow:jobs";
/// Sorted set of job ids scored by creation time (ms).
const INDEX_KEY: &str = "vesselflow:jobs:index";
const RECONNECT_MIN: Duration = Duration::from_millis(200);
const RECONNECT_MAX: Duration = Duration::from_secs(10);

/// KEYS[1] job hash, KEYS[2] marker set; ARGV[1] chunk index, ARGV[2] channel, ARGV[3] job id.
/// Returns -1 for a missing job, 0 when already counted, 1 when counted now.
const RECORD_CHUNK_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return -1 end
if redis.call('SADD', KEYS[2], ARGV[1]) == 0 then return 0 end
redis.call('HINCRBY', KEYS[1], 'processed', 1)
redis.call('PUBLISH', ARGV[2], ARGV[3])
return 1
"#;

#[derive(Debug, Clone)]
pub struct RedisJobStore {
    client: redis::Client,
}

impl RedisJobStore {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(StoreError::storage)?;
        Ok(Self { client })
    }

    fn job_key(job_id: JobId) -> String {
        format!("{KEY_PREFIX}:{job_id}")
    }

    fn chunks_key(job_id: JobId) -> String {
        format!("{KEY_PREFIX}:{job_id}:chunks")
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        self.client.get_connection().map_err(StoreError::storage)
    }

    fn read(conn: &mut redis::Connection, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let (doc, processed): (Option<String>, Option<u32>) = redis::cmd("HMGET")
            .arg(Self::job_key(job_id))
            .arg("doc")
            .arg("processed")
            .query(conn)
            .map_err(StoreError::storage)?;

        let Some(doc) = doc else {
            return Ok(None);
        };
        let mut job: Job = serde_json::from_str(&doc)?;
        job.processed_chunks = processed.unwrap_or(0);
        Ok(Some(job))
    }

    fn announce(conn: &mut redis::Connection, job_id: JobId) {
        let published: redis::RedisResult<i64> = conn.publish(CHANGES_CHANNEL, job_id.to_string());
        if let Err(e) = published {
            warn!(%job_id, error = %e, "failed to announce job change");
        }
    }
}

impl JobStore for RedisJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    fn create(&self, job: Job) -> Result<Job, StoreError> {
        let mut conn = self.connection()?;
        let doc = serde_json::to_string(&job)?;
        let key = Self::job_key(job.id);

        let (created, _, _): (bool, bool, i64) = redis::pipe()
            .atomic()
            .hset_nx(&key, "doc", doc)
            .hset_nx(&key, "processed", job.processed_chunks)
            .zadd(INDEX_KEY, job.id.to_string(), job.created_at.timestamp_millis())
            .query(&mut conn)
            .map_err(StoreError::storage)?;
        if !created {
            return Err(StoreError::AlreadyExists(job.id));
        }

        Self::announce(&mut conn, job.id);
        Ok(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let mut conn = self.connection()?;
        Self::read(&mut conn, job_id)
    }

    #[instrument(skip(self, transition), fields(job_id = %job_id), err)]
    fn apply(&self, job_id: JobId, transition: &JobTransition) -> Result<Applied, StoreError> {
        let mut conn = self.connection()?;
        let key = Self::job_key(job_id);

        // The closure re-runs whenever the watched hash changed before EXEC.
        let outcome: Result<Applied, StoreError> =
            redis::transaction(&mut conn, &[key.as_str()], |conn, pipe| {
                let mut job = match Self::read(conn, job_id) {
                    Ok(Some(job)) => job,
                    Ok(None) => return Ok(Some(Err(StoreError::JobNotFound(job_id)))),
                    Err(e) => return Ok(Some(Err(e))),
                };

                match job.apply(transition) {
                    Ok(Applied::Unchanged) => Ok(Some(Ok(Applied::Unchanged))),
                    Ok(Applied::Changed) => {
                        let doc = match serde_json::to_string(&job) {
                            Ok(doc) => doc,
                            Err(e) => return Ok(Some(Err(e.into()))),
                        };
                        let committed: Option<()> = pipe.hset(&key, "doc", doc).ignore().query(conn)?;
                        Ok(committed.map(|()| Ok(Applied::Changed)))
                    }
                    Err(e) => Ok(Some(Err(e.into()))),
                }
            })
            .map_err(StoreError::storage)?;

        if matches!(outcome, Ok(Applied::Changed)) {
            Self::announce(&mut conn, job_id);
        }
        outcome
    }

    #[instrument(skip(self), err)]
    fn record_chunk_processed(&self, job_id: JobId, chunk_index: u32) -> Result<Applied, StoreError> {
        let mut conn = self.connection()?;

        // The chunk count never changes once set, so the range check can run outside the script.
        let job = Self::read(&mut conn, job_id)?.ok_or(StoreError::JobNotFound(job_id))?;
        job.accepts_chunk(chunk_index)?;

        let result: i64 = redis::Script::new(RECORD_CHUNK_SCRIPT)
            .key(Self::job_key(job_id))
            .key(Self::chunks_key(job_id))
            .arg(chunk_index)
            .arg(CHANGES_CHANNEL)
            .arg(job_id.to_string())
            .invoke(&mut conn)
            .map_err(StoreError::storage)?;

        match result {
            1 => Ok(Applied::Changed),
            0 => {
                debug!(%job_id, chunk_index, "chunk already counted");
                Ok(Applied::Unchanged)
            }
            _ => Err(StoreError::JobNotFound(job_id)),
        }
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        let mut conn = self.connection()?;
        let ids: Vec<String> = conn.zrevrange(INDEX_KEY, 0, -1).map_err(StoreError::storage)?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(job_id) = JobId::from_str(&id) else {
                warn!(member = %id, "skipping malformed job index entry");
                continue;
            };
            if let Some(job) = Self::read(&mut conn, job_id)? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    fn subscribe(&self) -> Subscription<Job> {
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();

        let spawned = thread::Builder::new()
            .name("job-changes".to_string())
            .spawn(move || forward_changes(&client, &tx));
        if let Err(e) = spawned {
            error!(error = %e, "could not start job change subscription");
        }

        Subscription::new(rx)
    }

}

/// Forward changed documents to `tx` until its receiver is dropped, reconnecting on any
/// Redis failure. Notifications published while disconnected are lost.
fn forward_changes(client: &redis::Client, tx: &mpsc::Sender<Job>) {
    let mut backoff = RECONNECT_MIN;
    loop {
        match pump_changes(client, tx, &mut backoff) {
            Ok(()) => return,
            Err(e) => {
                error!(
                    error = %e,
                    retry_in_ms = backoff.as_millis() as u64,
                    "job change subscription lost redis, reconnecting"
                );
                thread::sleep(backoff);
                backoff = (backoff * 2).min(RECONNECT_MAX);
            }
        }
    }
}

/// `Ok` once the receiver is dropped; `Err` on any Redis failure.
fn pump_changes(client: &redis::Client, tx: &mpsc::Sender<Job>, backoff: &mut Duration) -> Result<(), StoreError> {
    let mut listener = client.get_connection().map_err(StoreError::storage)?;
    let mut reader = client.get_connection().map_err(StoreError::storage)?;
    let mut pubsub = listener.as_pubsub();
    pubsub.subscribe(CHANGES_CHANNEL).map_err(StoreError::storage)?;
    info!("job change subscription connected");
    *backoff = RECONNECT_MIN;

    loop {
        let msg = pubsub.get_message().map_err(StoreError::storage)?;
        let Ok(payload) = msg.get_payload::<String>() else {
            continue;
        };
        let Ok(job_id) = JobId::from_str(&payload) else {
            debug!(%payload, "ignoring malformed job change");
            continue;
        };

        if let Some(job) = RedisJobStore::read(&mut reader, job_id)? {
            if tx.send(job).is_err() {
                return Ok(());
            }
        }
    }
}
