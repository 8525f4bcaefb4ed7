//! `vesselflow-events`: work queue mechanics (publish / subscribe / redeliver).
//!
//! Transport-agnostic: the chunk pipeline only relies on the [`WorkQueue`] contract
//! (at-least-once, unordered, duplicates possible).

pub mod bus;
pub mod in_memory_bus;
pub mod redelivery;

pub use bus::{Delivery, QueueError, Subscription, WorkQueue};
pub use in_memory_bus::{DeadLetter, InMemoryWorkQueue};
pub use redelivery::{BackoffStrategy, RedeliveryPolicy};
