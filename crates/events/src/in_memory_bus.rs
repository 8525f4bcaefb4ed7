//! In-memory work queue for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

use crate::bus::{Delivery, QueueError, Subscription, WorkQueue};
use crate::redelivery::RedeliveryPolicy;

/// A payload that ran out of delivery attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter<M> {
    pub topic: String,
    pub payload: M,
    pub attempts: u32,
}

#[derive(Debug)]
struct TopicState<M> {
    subscribers: Vec<Sender<Delivery<M>>>,
    next: usize,
    /// Held until the first subscriber shows up.
    backlog: VecDeque<Delivery<M>>,
}

impl<M> Default for TopicState<M> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            next: 0,
            backlog: VecDeque::new(),
        }
    }
}

impl<M> TopicState<M> {
    /// Round-robin to one live subscriber; dead ones are pruned on the way.
    fn dispatch(&mut self, mut delivery: Delivery<M>) {
        while !self.subscribers.is_empty() {
            let slot = self.next % self.subscribers.len();
            match self.subscribers[slot].send(delivery) {
                Ok(()) => {
                    self.next = slot + 1;
                    return;
                }
                Err(mpsc::SendError(returned)) => {
                    self.subscribers.remove(slot);
                    delivery = returned;
                }
            }
        }
        self.backlog.push_back(delivery);
    }
}

#[derive(Debug)]
struct QueueState<M> {
    topics: HashMap<String, TopicState<M>>,
    dead_letters: Vec<DeadLetter<M>>,
    published: u64,
    acked: u64,
}

impl<M> Default for QueueState<M> {
    fn default() -> Self {
        Self {
            topics: HashMap::new(),
            dead_letters: Vec::new(),
            published: 0,
            acked: 0,
        }
    }
}

/// In-memory competing-consumer queue.
///
/// - No IO / no async
/// - One subscriber per delivery (round-robin)
/// - At-least-once: nacked payloads come back per [`RedeliveryPolicy`], and
///   [`with_duplicate_delivery`](Self::with_duplicate_delivery) injects spurious duplicates
#[derive(Debug)]
pub struct InMemoryWorkQueue<M> {
    state: Arc<Mutex<QueueState<M>>>,
    policy: RedeliveryPolicy,
    duplicate_every: Option<u64>,
}

impl<M> Default for InMemoryWorkQueue<M> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            policy: RedeliveryPolicy::default(),
            duplicate_every: None,
        }
    }
}

impl<M> InMemoryWorkQueue<M>
where
    M: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: RedeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Deliver every `n`-th published payload twice.
    pub fn with_duplicate_delivery(mut self, every_n: u64) -> Self {
        self.duplicate_every = (every_n > 0).then_some(every_n);
        self
    }

    pub fn policy(&self) -> &RedeliveryPolicy {
        &self.policy
    }

    /// Payloads that exhausted their attempts, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter<M>> {
        self.state
            .lock()
            .map(|state| state.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Deliveries acknowledged by their handlers so far.
    pub fn acked(&self) -> u64 {
        self.state.lock().map(|state| state.acked).unwrap_or(0)
    }

    /// Payloads waiting for a subscriber on `topic`.
    pub fn backlog_len(&self, topic: &str) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.topics.get(topic).map(|t| t.backlog.len()))
            .unwrap_or(0)
    }

    fn dispatch(state: &Mutex<QueueState<M>>, delivery: Delivery<M>) -> Result<(), QueueError> {
        let mut state = state
            .lock()
            .map_err(|_| QueueError::Unavailable("queue lock poisoned".into()))?;
        state
            .topics
            .entry(delivery.topic.clone())
            .or_default()
            .dispatch(delivery);
        Ok(())
    }
}

impl<M> WorkQueue<M> for InMemoryWorkQueue<M>
where
    M: Clone + Send + 'static,
{
    fn publish(&self, topic: &str, payload: M) -> Result<(), QueueError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QueueError::Unavailable("queue lock poisoned".into()))?;
        state.published += 1;
        let duplicate = self
            .duplicate_every
            .is_some_and(|n| state.published % n == 0);

        let delivery = Delivery::first(topic, payload);
        let topic_state = state.topics.entry(topic.to_string()).or_default();
        if duplicate {
            tracing::debug!(topic, "injecting duplicate delivery");
            topic_state.dispatch(delivery.clone().redelivered());
        }
        topic_state.dispatch(delivery);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Subscription<Delivery<M>> {
        let (tx, rx) = mpsc::channel();

        // A poisoned lock still hands back a subscription; it just never receives.
        if let Ok(mut state) = self.state.lock() {
            let topic_state = state.topics.entry(topic.to_string()).or_default();
            while let Some(pending) = topic_state.backlog.pop_front() {
                if tx.send(pending).is_err() {
                    break;
                }
            }
            topic_state.subscribers.push(tx);
        }

        Subscription::new(rx)
    }

    fn ack(&self, _delivery: &Delivery<M>) -> Result<(), QueueError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QueueError::Unavailable("queue lock poisoned".into()))?;
        state.acked += 1;
        Ok(())
    }

    fn nack(&self, delivery: Delivery<M>) -> Result<(), QueueError> {
        if !self.policy.should_redeliver(delivery.attempt) {
            tracing::warn!(
                topic = %delivery.topic,
                attempts = delivery.attempt,
                "delivery attempts exhausted; dead-lettering"
            );
            let mut state = self
                .state
                .lock()
                .map_err(|_| QueueError::Unavailable("queue lock poisoned".into()))?;
            state.dead_letters.push(DeadLetter {
                topic: delivery.topic,
                payload: delivery.payload,
                attempts: delivery.attempt,
            });
            return Ok(());
        }

        let delay = self.policy.delay_for_attempt(delivery.attempt);
        let next = delivery.redelivered();
        if delay.is_zero() {
            return Self::dispatch(&self.state, next);
        }

        let state = Arc::clone(&self.state);
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if let Err(e) = Self::dispatch(&state, next) {
                tracing::error!(error = %e, "delayed redelivery failed");
            }
        });
        Ok(())
    }
}
