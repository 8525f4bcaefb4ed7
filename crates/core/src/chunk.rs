//! Chunk references and the work item that fans a chunk out to a worker.

use serde::{Deserialize, Serialize};

use crate::id::JobId;

/// Location of a durable object (object-store path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(String);

impl ObjectRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of work: "classify chunk `chunk_index` of job `job_id`".
///
/// Published once per chunk, only after the chunk payload is durable. Wire names
/// follow the queue message format (`jobId`, `chunkId`, `chunkPath`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    #[serde(rename = "chunkId")]
    pub chunk_index: u32,
    #[serde(rename = "chunkPath")]
    pub storage_ref: ObjectRef,
}
