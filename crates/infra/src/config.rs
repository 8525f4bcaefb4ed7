//! Configuration loading and representation.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vesselflow_events::RedeliveryPolicy;

use crate::error::ConfigError;

pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const PROCESS_CHUNK_TOPIC: &str = "process-chunk";
pub const UPLOADS_PREFIX: &str = "uploads/";
pub const CHUNKS_PREFIX: &str = "chunks/";

/// Runtime settings for the pipeline and its HTTP front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Vessels per chunk (the last chunk may be smaller).
    pub chunk_size: usize,
    /// Chunk worker threads.
    pub workers: usize,
    pub topic: String,
    pub uploads_prefix: String,
    pub chunks_prefix: String,
    /// Trained model file; the constant classifier is used when unset or unreadable.
    pub model_path: Option<PathBuf>,
    /// Root of the filesystem object store.
    pub data_dir: PathBuf,
    /// Redis job/result store; in-memory stores when unset.
    pub redis_url: Option<String>,
    pub bind_addr: String,
    pub max_delivery_attempts: u32,
    /// How often the completion watcher re-checks every `processing` job, in milliseconds.
    pub completion_sweep_ms: u64,
    /// Idle time after which another consumer may claim an unacked Redis queue entry.
    pub queue_pending_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 4,
            topic: PROCESS_CHUNK_TOPIC.to_string(),
            uploads_prefix: UPLOADS_PREFIX.to_string(),
            chunks_prefix: CHUNKS_PREFIX.to_string(),
            model_path: None,
            data_dir: PathBuf::from("./data"),
            redis_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            max_delivery_attempts: 5,
            completion_sweep_ms: 5_000,
            queue_pending_timeout_ms: 30_000,
        }
    }
}

impl PipelineConfig {
    /// Read `VESSELFLOW_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("VESSELFLOW_CHUNK_SIZE") {
            config.chunk_size = parse_positive("VESSELFLOW_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("VESSELFLOW_WORKERS") {
            config.workers = parse_positive("VESSELFLOW_WORKERS", &v)?;
        }
        if let Some(v) = get("VESSELFLOW_MAX_DELIVERY_ATTEMPTS") {
            config.max_delivery_attempts = parse_positive("VESSELFLOW_MAX_DELIVERY_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("VESSELFLOW_COMPLETION_SWEEP_MS") {
            config.completion_sweep_ms = parse_positive("VESSELFLOW_COMPLETION_SWEEP_MS", &v)?;
        }
        if let Some(v) = get("VESSELFLOW_QUEUE_PENDING_TIMEOUT_MS") {
            config.queue_pending_timeout_ms = parse_positive("VESSELFLOW_QUEUE_PENDING_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("VESSELFLOW_MODEL_PATH") {
            config.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("VESSELFLOW_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("VESSELFLOW_REDIS_URL") {
            config.redis_url = Some(v);
        }
        if let Some(v) = get("VESSELFLOW_BIND_ADDR") {
            config.bind_addr = v;
        }

        Ok(config)
    }

    /// Redelivery for chunk work items that asked to be retried.
    pub fn redelivery_policy(&self) -> RedeliveryPolicy {
        RedeliveryPolicy::exponential(
            self.max_delivery_attempts,
            Duration::from_millis(100),
            Duration::from_secs(10),
        )
    }

    pub fn completion_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.completion_sweep_ms)
    }

    pub fn queue_pending_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_pending_timeout_ms)
    }
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let invalid = |message: String| ConfigError {
        key: key.to_string(),
        value: raw.to_string(),
        message,
    };

    let value = raw.trim().parse::<T>().map_err(|e| invalid(e.to_string()))?;
    if value <= T::default() {
        return Err(invalid("must be greater than zero".into()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_pipeline_constants() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.topic, "process-chunk");
        assert_eq!(config.uploads_prefix, "uploads/");
        assert_eq!(config.max_delivery_attempts, 5);
        assert_eq!(config.completion_sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.queue_pending_timeout(), Duration::from_secs(30));
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("VESSELFLOW_CHUNK_SIZE", "25"),
            ("VESSELFLOW_WORKERS", "2"),
            ("VESSELFLOW_REDIS_URL", "redis://127.0.0.1:6379"),
            ("VESSELFLOW_MODEL_PATH", "/models/vessel.json"),
            ("VESSELFLOW_COMPLETION_SWEEP_MS", "750"),
        ]))
        .unwrap();

        assert_eq!(config.chunk_size, 25);
        assert_eq!(config.workers, 2);
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.model_path, Some(PathBuf::from("/models/vessel.json")));
        assert_eq!(config.completion_sweep_interval(), Duration::from_millis(750));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("VESSELFLOW_CHUNK_SIZE", "0")])).unwrap_err();
        assert_eq!(err.key, "VESSELFLOW_CHUNK_SIZE");
    }

    #[test]
    fn garbage_is_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("VESSELFLOW_WORKERS", "many")])).unwrap_err();
        assert_eq!(err.value, "many");
    }

    #[test]
    fn blank_values_keep_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[("VESSELFLOW_REDIS_URL", "  ")])).unwrap();
        assert!(config.redis_url.is_none());
    }
}
