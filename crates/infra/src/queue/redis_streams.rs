//! Redis Streams-backed work queue (durable, at-least-once delivery).
//!
//! - **Stream key**: `vesselflow:queue:{topic}`, one stream per topic
//! - **Consumer group**: `vesselflow-workers`, so each entry goes to one subscriber
//! - **Acknowledgement**: an entry stays in the group's pending list until its handler
//!   acks it; entries idle longer than the pending timeout (the consumer died) are
//!   claimed by another subscriber and delivered again
//! - **Dead letters**: `vesselflow:queue:{topic}:dlq`, entries that exhausted their attempts
//!
//! A `nack` appends the payload again with its attempt number bumped, then acks the
//! original entry.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamPendingId, StreamReadOptions, StreamReadReply};
use redis::{Commands, RedisResult};
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument, warn};

use vesselflow_events::{Delivery, QueueError, RedeliveryPolicy, Subscription, WorkQueue};

const KEY_PREFIX: &str = "vesselflow:queue";
const CONSUMER_GROUP: &str = "vesselflow-workers";
/// One entry in flight per subscriber; the rest stay claimable in the stream.
const READ_BATCH: usize = 1;
const CLAIM_BATCH: usize = 10;
const BLOCK_MS: usize = 1000;

/// Pending entries idle longer than this are redelivered.
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(30);

const RECONNECT_MIN: Duration = Duration::from_millis(200);
const RECONNECT_MAX: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RedisStreamsWorkQueue {
    client: redis::Client,
    policy: RedeliveryPolicy,
    pending_timeout: Duration,
}

impl RedisStreamsWorkQueue {
    pub fn new(redis_url: impl AsRef<str>, policy: RedeliveryPolicy) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            policy,
            pending_timeout: DEFAULT_PENDING_TIMEOUT,
        })
    }

    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    fn stream_key(topic: &str) -> String {
        format!("{KEY_PREFIX}:{topic}")
    }

    fn dlq_key(topic: &str) -> String {
        format!("{KEY_PREFIX}:{topic}:dlq")
    }

    fn connection(&self) -> Result<redis::Connection, QueueError> {
        self.client
            .get_connection()
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }

    fn append(&self, key: &str, attempt: u32, payload: &JsonValue) -> Result<(), QueueError> {
        let body = serde_json::to_string(payload).map_err(|e| QueueError::Rejected(e.to_string()))?;
        let mut conn = self.connection()?;
        let _: String = conn
            .xadd(key, "*", &[("attempt", attempt.to_string()), ("payload", body)])
            .map_err(|e| QueueError::Unavailable(format!("XADD failed: {e}")))?;
        Ok(())
    }

    fn ack_receipt(&self, topic: &str, receipt: Option<&str>) -> Result<(), QueueError> {
        let Some(id) = receipt else {
            return Ok(());
        };
        let mut conn = self.connection()?;
        let _: i64 = conn
            .xack(Self::stream_key(topic), CONSUMER_GROUP, &[id])
            .map_err(|e| QueueError::Unavailable(format!("XACK failed: {e}")))?;
        Ok(())
    }

    /// Move a delivery to the DLQ stream and retire its entry.
    fn dead_letter(&self, delivery: &Delivery<JsonValue>) -> Result<(), QueueError> {
        warn!(
            topic = %delivery.topic,
            attempts = delivery.attempt,
            "delivery attempts exhausted; dead-lettering"
        );
        self.append(&Self::dlq_key(&delivery.topic), delivery.attempt, &delivery.payload)?;
        self.ack_receipt(&delivery.topic, delivery.receipt.as_deref())
    }
}

impl WorkQueue<JsonValue> for RedisStreamsWorkQueue {
    #[instrument(skip(self, payload), err)]
    fn publish(&self, topic: &str, payload: JsonValue) -> Result<(), QueueError> {
        self.append(&Self::stream_key(topic), 1, &payload)
    }

    fn subscribe(&self, topic: &str) -> Subscription<Delivery<JsonValue>> {
        // Rendezvous channel: an entry is only read once a worker is ready for it.
        let (tx, rx) = mpsc::sync_channel(0);
        let consumer = StreamConsumer {
            queue: self.clone(),
            topic: topic.to_string(),
            key: Self::stream_key(topic),
            name: format!("consumer-{}", uuid::Uuid::now_v7()),
        };

        let spawned = thread::Builder::new()
            .name(format!("queue-{topic}"))
            .spawn(move || consumer.run(&tx));
        if let Err(e) = spawned {
            error!(topic, error = %e, "could not start work queue subscription thread");
        }

        Subscription::new(rx)
    }

    #[instrument(skip(self, delivery), fields(topic = %delivery.topic, attempt = delivery.attempt), err)]
    fn ack(&self, delivery: &Delivery<JsonValue>) -> Result<(), QueueError> {
        self.ack_receipt(&delivery.topic, delivery.receipt.as_deref())
    }

    #[instrument(skip(self, delivery), fields(topic = %delivery.topic, attempt = delivery.attempt), err)]
    fn nack(&self, delivery: Delivery<JsonValue>) -> Result<(), QueueError> {
        if !self.policy.should_redeliver(delivery.attempt) {
            return self.dead_letter(&delivery);
        }

        let delay = self.policy.delay_for_attempt(delivery.attempt);
        let receipt = delivery.receipt.clone();
        let next = delivery.redelivered();
        if delay.is_zero() {
            self.append(&Self::stream_key(&next.topic), next.attempt, &next.payload)?;
            return self.ack_receipt(&next.topic, receipt.as_deref());
        }

        // The original entry stays pending until its replacement is appended.
        let queue = self.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            let requeued = queue
                .append(&Self::stream_key(&next.topic), next.attempt, &next.payload)
                .and_then(|()| queue.ack_receipt(&next.topic, receipt.as_deref()));
            if let Err(e) = requeued {
                error!(error = %e, "delayed redelivery failed");
            }
        });
        Ok(())
    }
}

/// One subscription's reader: claims stale entries first, then reads new ones.
struct StreamConsumer {
    queue: RedisStreamsWorkQueue,
    topic: String,
    key: String,
    name: String,
}

impl StreamConsumer {
    /// Forward entries until the subscriber goes away, reconnecting on Redis failures.
    fn run(&self, tx: &mpsc::SyncSender<Delivery<JsonValue>>) {
        let mut backoff = RECONNECT_MIN;
        loop {
            let outcome = self
                .queue
                .client
                .get_connection()
                .and_then(|mut conn| {
                    // Fails with BUSYGROUP when the group already exists.
                    let _: RedisResult<String> = conn.xgroup_create_mkstream(&self.key, CONSUMER_GROUP, "0");
                    info!(topic = %self.topic, consumer = %self.name, "work queue subscription connected");
                    self.pump(&mut conn, tx, &mut backoff)
                });

            match outcome {
                Ok(()) => return,
                Err(e) => {
                    error!(
                        topic = %self.topic,
                        error = %e,
                        retry_in_ms = backoff.as_millis() as u64,
                        "work queue subscription lost redis, reconnecting"
                    );
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(RECONNECT_MAX);
                }
            }
        }
    }

    /// `Ok` once the receiver is dropped; `Err` on any Redis failure.
    fn pump(
        &self,
        conn: &mut redis::Connection,
        tx: &mpsc::SyncSender<Delivery<JsonValue>>,
        backoff: &mut Duration,
    ) -> RedisResult<()> {
        let opts = StreamReadOptions::default()
            .group(CONSUMER_GROUP, &self.name)
            .count(READ_BATCH)
            .block(BLOCK_MS);

        loop {
            let mut batch = self.claim_stale(conn)?;
            if batch.is_empty() {
                let reply: Option<StreamReadReply> = conn.xread_options(&[&self.key], &[">"], &opts)?;
                batch = reply
                    .into_iter()
                    .flat_map(|r| r.keys)
                    .flat_map(|k| k.ids)
                    .map(|entry| (entry, 0))
                    .collect();
            }
            *backoff = RECONNECT_MIN;

            for (entry, prior_deliveries) in batch {
                let Some(delivery) = self.decode(conn, entry, prior_deliveries)? else {
                    continue;
                };
                if delivery.attempt > self.queue.policy.max_attempts {
                    if let Err(e) = self.queue.dead_letter(&delivery) {
                        warn!(topic = %self.topic, error = %e, "could not dead-letter stale entry");
                    }
                    continue;
                }
                // Unacked entries stay pending and are claimed by another consumer.
                if tx.send(delivery).is_err() {
                    return Ok(());
                }
            }
        }
    }

    /// Claim entries whose consumer has held them longer than the pending timeout.
    fn claim_stale(&self, conn: &mut redis::Connection) -> RedisResult<Vec<(StreamId, usize)>> {
        let pending: StreamPendingCountReply = conn.xpending_count(&self.key, CONSUMER_GROUP, "-", "+", CLAIM_BATCH)?;
        let min_idle_ms = self.queue.pending_timeout.as_millis() as usize;
        let stale = stale_entries(&pending.ids, min_idle_ms);
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = stale.iter().map(|p| p.id.as_str()).collect();
        let claimed: StreamClaimReply = conn.xclaim(&self.key, CONSUMER_GROUP, &self.name, min_idle_ms, &ids[..])?;
        if !claimed.ids.is_empty() {
            warn!(topic = %self.topic, entries = claimed.ids.len(), "reclaimed stale work items");
        }

        Ok(claimed
            .ids
            .into_iter()
            .map(|entry| {
                let prior = stale
                    .iter()
                    .find(|p| p.id == entry.id)
                    .map(|p| p.times_delivered)
                    .unwrap_or(1);
                (entry, prior)
            })
            .collect())
    }

    fn decode(
        &self,
        conn: &mut redis::Connection,
        entry: StreamId,
        prior_deliveries: usize,
    ) -> RedisResult<Option<Delivery<JsonValue>>> {
        let stored = entry
            .get::<String>("attempt")
            .and_then(|a| a.parse::<u32>().ok())
            .unwrap_or(1);
        let Some(payload) = entry
            .get::<String>("payload")
            .and_then(|p| serde_json::from_str::<JsonValue>(&p).ok())
        else {
            warn!(topic = %self.topic, id = %entry.id, "dropping stream entry without a JSON payload");
            let _: i64 = conn.xack(&self.key, CONSUMER_GROUP, &[&entry.id])?;
            return Ok(None);
        };

        Ok(Some(Delivery {
            topic: self.topic.clone(),
            payload,
            attempt: delivery_attempt(stored, prior_deliveries),
            receipt: Some(entry.id),
        }))
    }
}

fn stale_entries(pending: &[StreamPendingId], min_idle_ms: usize) -> Vec<&StreamPendingId> {
    pending
        .iter()
        .filter(|p| p.last_delivered_ms >= min_idle_ms)
        .collect()
}

/// Attempt number of an entry handed out again after `prior_deliveries` lost deliveries.
fn delivery_attempt(stored: u32, prior_deliveries: usize) -> u32 {
    let prior = u32::try_from(prior_deliveries).unwrap_or(u32::MAX);
    stored.saturating_add(prior)
}
