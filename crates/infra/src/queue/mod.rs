//! Infrastructure work queue implementations.
//!
//! The queue contract lives in `vesselflow-events` as pure mechanics; this module
//! provides transport-backed implementations (e.g. Redis).

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsWorkQueue;
