//! Work queue abstraction (mechanics only).
//!
//! A work queue distributes each published payload to **one** handler, at least once:
//!
//! - **At-least-once**: a payload may be delivered more than once (redelivery after a
//!   timeout, a `nack`, or transport retries); handlers must be idempotent
//! - **No ordering**: payloads may arrive in any order, including across topics
//! - **Competing consumers**: subscribers on the same topic share the work
//!
//! The chunk pipeline is built to converge under exactly these guarantees, so any
//! transport honoring this contract (in-memory, Pub/Sub, Redis Streams) can back it.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A payload handed to one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<M> {
    pub topic: String,
    pub payload: M,
    /// 1 for the first delivery, incremented on each redelivery.
    pub attempt: u32,
    /// Transport handle used to acknowledge this delivery (a stream entry id).
    /// `None` for transports that forget a payload once it is handed out.
    pub receipt: Option<String>,
}

impl<M> Delivery<M> {
    pub fn first(topic: impl Into<String>, payload: M) -> Self {
        Self {
            topic: topic.into(),
            payload,
            attempt: 1,
            receipt: None,
        }
    }

    pub fn with_receipt(mut self, receipt: impl Into<String>) -> Self {
        self.receipt = Some(receipt.into());
        self
    }

    /// The same payload, one attempt later, as a new transport message.
    pub fn redelivered(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            receipt: None,
            ..self
        }
    }
}

/// Receiving end of a topic subscription.
///
/// ## Usage Pattern
///
/// ```ignore
/// let sub = queue.subscribe("process-chunk");
/// loop {
///     match sub.recv_timeout(Duration::from_millis(250)) {
///         Ok(delivery) => handle(delivery),
///         Err(RecvTimeoutError::Timeout) => continue,  // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // queue dropped
///     }
/// }
/// ```
///
/// Subscriptions are consumed by one thread; spawn one subscription per worker.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Queue transport failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("payload rejected: {0}")]
    Rejected(String),
}

/// At-least-once, unordered work queue.
///
/// Object-safe so collaborators can hold an `Arc<dyn WorkQueue<M>>` chosen at startup.
pub trait WorkQueue<M>: Send + Sync {
    /// Publish a payload; it will be delivered to one subscriber of `topic`.
    fn publish(&self, topic: &str, payload: M) -> Result<(), QueueError>;

    /// Join the competing consumers of `topic`.
    fn subscribe(&self, topic: &str) -> Subscription<Delivery<M>>;

    /// The handler is done with `delivery`; the queue must not deliver it again.
    ///
    /// Handlers ack only after their side effects are durable. A delivery that is
    /// neither acked nor nacked (the consumer died) is redelivered by the transport.
    fn ack(&self, delivery: &Delivery<M>) -> Result<(), QueueError>;

    /// Hand a delivery back: the handler could not finish and wants it redelivered.
    fn nack(&self, delivery: Delivery<M>) -> Result<(), QueueError>;
}

impl<M, Q> WorkQueue<M> for Arc<Q>
where
    Q: WorkQueue<M> + ?Sized,
{
    fn publish(&self, topic: &str, payload: M) -> Result<(), QueueError> {
        (**self).publish(topic, payload)
    }

    fn subscribe(&self, topic: &str) -> Subscription<Delivery<M>> {
        (**self).subscribe(topic)
    }

    fn ack(&self, delivery: &Delivery<M>) -> Result<(), QueueError> {
        (**self).ack(delivery)
    }

    fn nack(&self, delivery: Delivery<M>) -> Result<(), QueueError> {
        (**self).nack(delivery)
    }
}
