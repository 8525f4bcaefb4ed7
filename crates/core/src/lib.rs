//! `vesselflow-core`: job record, chunk and prediction types shared by every crate.
//!
//! This crate contains **pure** data types and the job state machine (no IO).

pub mod chunk;
pub mod error;
pub mod id;
pub mod job;
pub mod prediction;

pub use chunk::{ObjectRef, WorkItem};
pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{Applied, Job, JobStatus, JobTransition};
pub use prediction::{PredictionResult, ResultBatch, VesselClass};
