//! Job record and its lifecycle state machine.
//!
//! ## Lifecycle
//!
//! ```text
//! validating -> preprocessing -> splitting -> processing -> completed
//!      \______________\______________\____________\______-> error
//! ```
//!
//! - Status only moves forward, one step at a time.
//! - `error` can be entered from any active state and is terminal; nothing moves a job
//!   out of `error`, not even every chunk finishing afterwards.
//! - `completed` is only reachable from `processing`, once `chunk_count` is known and
//!   every chunk has been counted.
//!
//! All transitions are expressed as [`JobTransition`] values so a document store can
//! apply them atomically against the current stored state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::JobId;

/// Job lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Validating,
    Preprocessing,
    Splitting,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Validating => "validating",
            JobStatus::Preprocessing => "preprocessing",
            JobStatus::Splitting => "splitting",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// The single forward successor of an active status.
    pub fn successor(self) -> Option<JobStatus> {
        match self {
            JobStatus::Validating => Some(JobStatus::Preprocessing),
            JobStatus::Preprocessing => Some(JobStatus::Splitting),
            JobStatus::Splitting => Some(JobStatus::Processing),
            JobStatus::Processing => Some(JobStatus::Completed),
            JobStatus::Completed | JobStatus::Error => None,
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStatus::Error || self.successor() == Some(next)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested change to a job document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobTransition {
    /// Move through the ingestion phases (`preprocessing`, `splitting`).
    Advance { to: JobStatus },
    /// Every chunk has been persisted and enqueued.
    SplitCompleted { chunk_count: u32, vessel_count: u32 },
    /// Finalize if (and only if) every chunk has been counted.
    Complete { at: DateTime<Utc> },
    /// Job-level failure.
    Fail { message: String },
}

/// Whether applying a transition changed the stored document.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
}

impl Applied {
    pub fn changed(self) -> bool {
        matches!(self, Applied::Changed)
    }
}

/// A processing job: one uploaded dataset, fanned out into chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Object-store path of the uploaded dataset.
    pub source_file: String,
    pub status: JobStatus,
    /// Unset until the splitter has enqueued every chunk.
    pub chunk_count: Option<u32>,
    pub processed_chunks: u32,
    pub vessel_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    /// Create a new job in `validating`.
    pub fn new(source_file: impl Into<String>) -> Self {
        Self::with_id(JobId::new(), source_file)
    }

    pub fn with_id(id: JobId, source_file: impl Into<String>) -> Self {
        Self {
            id,
            source_file: source_file.into(),
            status: JobStatus::Validating,
            chunk_count: None,
            processed_chunks: 0,
            vessel_count: None,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Display name of the uploaded file (last path segment).
    pub fn file_name(&self) -> &str {
        self.source_file
            .rsplit('/')
            .next()
            .unwrap_or(self.source_file.as_str())
    }

    /// `true` once the job is in `processing` with a known, non-zero chunk count and
    /// every chunk counted. Never `true` while the chunk count is unset.
    pub fn is_ready_to_complete(&self) -> bool {
        self.status == JobStatus::Processing
            && matches!(self.chunk_count, Some(total) if total > 0 && self.processed_chunks == total)
    }

    /// Apply a transition against the current state.
    ///
    /// Re-applying a transition the job has already undergone is `Unchanged`, so stores
    /// can apply transitions from redelivered or duplicated triggers safely.
    pub fn apply(&mut self, transition: &JobTransition) -> DomainResult<Applied> {
        match transition {
            JobTransition::Advance { to } => {
                if self.status == *to {
                    return Ok(Applied::Unchanged);
                }
                if !matches!(to, JobStatus::Preprocessing | JobStatus::Splitting) {
                    return Err(DomainError::invariant(format!(
                        "`{to}` is not an ingestion phase"
                    )));
                }
                self.ensure_can_move_to(*to)?;
                self.status = *to;
                Ok(Applied::Changed)
            }
            JobTransition::SplitCompleted {
                chunk_count,
                vessel_count,
            } => {
                if self.status == JobStatus::Processing && self.chunk_count == Some(*chunk_count) {
                    return Ok(Applied::Unchanged);
                }
                self.ensure_can_move_to(JobStatus::Processing)?;
                if self.processed_chunks > *chunk_count {
                    return Err(DomainError::invariant(format!(
                        "{} chunks already counted but only {} were produced",
                        self.processed_chunks, chunk_count
                    )));
                }
                self.chunk_count = Some(*chunk_count);
                self.vessel_count = Some(*vessel_count);
                self.status = JobStatus::Processing;
                Ok(Applied::Changed)
            }
            JobTransition::Complete { at } => {
                if !self.is_ready_to_complete() {
                    return Ok(Applied::Unchanged);
                }
                self.status = JobStatus::Completed;
                self.completed_at = Some(*at);
                Ok(Applied::Changed)
            }
            JobTransition::Fail { message } => {
                if self.status.is_terminal() {
                    return Ok(Applied::Unchanged);
                }
                self.status = JobStatus::Error;
                self.error = Some(message.clone());
                Ok(Applied::Changed)
            }
        }
    }

    /// Check a chunk index against the known chunk count before counting it.
    pub fn accepts_chunk(&self, chunk_index: u32) -> DomainResult<()> {
        match self.chunk_count {
            Some(total) if chunk_index >= total => Err(DomainError::invariant(format!(
                "chunk {chunk_index} out of range for job {} with {total} chunks",
                self.id
            ))),
            _ => Ok(()),
        }
    }

    fn ensure_can_move_to(&self, next: JobStatus) -> DomainResult<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_in_processing(chunks: u32) -> Job {
        let mut job = Job::new("uploads/ais.csv");
        job.apply(&JobTransition::Advance { to: JobStatus::Preprocessing }).unwrap();
        job.apply(&JobTransition::Advance { to: JobStatus::Splitting }).unwrap();
        job.apply(&JobTransition::SplitCompleted {
            chunk_count: chunks,
            vessel_count: chunks * 100,
        })
        .unwrap();
        job
    }

    #[test]
    fn new_job_starts_validating_without_chunk_count() {
        let job = Job::new("uploads/ais.csv");
        assert_eq!(job.status, JobStatus::Validating);
        assert_eq!(job.chunk_count, None);
        assert_eq!(job.processed_chunks, 0);
        assert_eq!(job.file_name(), "ais.csv");
    }

    #[test]
    fn full_happy_path() {
        let mut job = job_in_processing(3);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.chunk_count, Some(3));

        job.processed_chunks = 3;
        let at = Utc::now();
        assert_eq!(job.apply(&JobTransition::Complete { at }).unwrap(), Applied::Changed);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, Some(at));
    }

    #[test]
    fn cannot_skip_phases() {
        let mut job = Job::new("uploads/ais.csv");
        let err = job
            .apply(&JobTransition::Advance { to: JobStatus::Splitting })
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: JobStatus::Validating,
                to: JobStatus::Splitting
            }
        );
    }

    #[test]
    fn cannot_move_backwards() {
        let mut job = job_in_processing(2);
        assert!(job
            .apply(&JobTransition::Advance { to: JobStatus::Splitting })
            .is_err());
    }

    #[test]
    fn completion_is_conservative_without_chunk_count() {
        let mut job = Job::new("uploads/ais.csv");
        job.apply(&JobTransition::Advance { to: JobStatus::Preprocessing }).unwrap();
        job.apply(&JobTransition::Advance { to: JobStatus::Splitting }).unwrap();
        // Workers may finish before the splitter publishes the total.
        job.processed_chunks = 2;

        assert!(!job.is_ready_to_complete());
        assert_eq!(
            job.apply(&JobTransition::Complete { at: Utc::now() }).unwrap(),
            Applied::Unchanged
        );
        assert_eq!(job.status, JobStatus::Splitting);
    }

    #[test]
    fn completion_waits_for_every_chunk() {
        let mut job = job_in_processing(3);
        job.processed_chunks = 2;
        assert_eq!(
            job.apply(&JobTransition::Complete { at: Utc::now() }).unwrap(),
            Applied::Unchanged
        );
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn completion_is_idempotent() {
        let mut job = job_in_processing(1);
        job.processed_chunks = 1;
        let first = Utc::now();
        job.apply(&JobTransition::Complete { at: first }).unwrap();

        let later = first + chrono::Duration::seconds(5);
        for _ in 0..3 {
            assert_eq!(
                job.apply(&JobTransition::Complete { at: later }).unwrap(),
                Applied::Unchanged
            );
        }
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, Some(first));
    }

    #[test]
    fn zero_chunks_never_complete() {
        let mut job = job_in_processing(0);
        assert!(!job.is_ready_to_complete());
    }

    #[test]
    fn error_is_reachable_from_any_active_state_and_sticky() {
        for steps in 0..4 {
            let mut job = Job::new("uploads/ais.csv");
            let path = [
                JobTransition::Advance { to: JobStatus::Preprocessing },
                JobTransition::Advance { to: JobStatus::Splitting },
                JobTransition::SplitCompleted { chunk_count: 1, vessel_count: 1 },
            ];
            for t in path.iter().take(steps) {
                job.apply(t).unwrap();
            }

            let fail = JobTransition::Fail { message: "boom".into() };
            assert_eq!(job.apply(&fail).unwrap(), Applied::Changed);
            assert_eq!(job.status, JobStatus::Error);
            assert_eq!(job.error.as_deref(), Some("boom"));

            // Every chunk finishing afterwards does not resurrect the job.
            job.chunk_count = Some(1);
            job.processed_chunks = 1;
            assert_eq!(
                job.apply(&JobTransition::Complete { at: Utc::now() }).unwrap(),
                Applied::Unchanged
            );
            assert_eq!(job.status, JobStatus::Error);
        }
    }

    #[test]
    fn completed_job_ignores_late_failures() {
        let mut job = job_in_processing(1);
        job.processed_chunks = 1;
        job.apply(&JobTransition::Complete { at: Utc::now() }).unwrap();

        let applied = job
            .apply(&JobTransition::Fail { message: "late".into() })
            .unwrap();
        assert_eq!(applied, Applied::Unchanged);
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[test]
    fn split_completed_rejects_counter_overflow() {
        let mut job = Job::new("uploads/ais.csv");
        job.apply(&JobTransition::Advance { to: JobStatus::Preprocessing }).unwrap();
        job.apply(&JobTransition::Advance { to: JobStatus::Splitting }).unwrap();
        job.processed_chunks = 4;

        let err = job
            .apply(&JobTransition::SplitCompleted { chunk_count: 3, vessel_count: 250 })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn accepts_chunk_checks_bounds_once_known() {
        let mut job = Job::new("uploads/ais.csv");
        assert!(job.accepts_chunk(17).is_ok());

        job.chunk_count = Some(3);
        assert!(job.accepts_chunk(2).is_ok());
        assert!(job.accepts_chunk(3).is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::Preprocessing).unwrap();
        assert_eq!(json, "\"preprocessing\"");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn rank(status: JobStatus) -> u8 {
            match status {
                JobStatus::Validating => 0,
                JobStatus::Preprocessing => 1,
                JobStatus::Splitting => 2,
                JobStatus::Processing => 3,
                JobStatus::Completed | JobStatus::Error => 4,
            }
        }

        fn transition() -> impl Strategy<Value = JobTransition> {
            prop_oneof![
                Just(JobTransition::Advance { to: JobStatus::Preprocessing }),
                Just(JobTransition::Advance { to: JobStatus::Splitting }),
                (0u32..5).prop_map(|c| JobTransition::SplitCompleted { chunk_count: c, vessel_count: c * 10 }),
                Just(JobTransition::Complete { at: Utc::now() }),
                Just(JobTransition::Fail { message: "boom".to_string() }),
            ]
        }

        proptest! {
            /// Property: whatever arrives, in whatever order, status never moves backwards
            /// and a terminal job stays terminal.
            #[test]
            fn status_only_moves_forward(
                steps in prop::collection::vec((transition(), 0u32..3), 0..40)
            ) {
                let mut job = Job::new("uploads/ais.csv");
                for (t, bump) in steps {
                    let before = job.clone();
                    // Concurrent workers count chunks independently of the status.
                    if let Some(total) = job.chunk_count {
                        job.processed_chunks = (job.processed_chunks + bump).min(total);
                    }
                    let _ = job.apply(&t);

                    prop_assert!(rank(job.status) >= rank(before.status));
                    if before.status.is_terminal() {
                        prop_assert_eq!(job.status, before.status);
                    }
                    if let Some(total) = job.chunk_count {
                        prop_assert!(job.processed_chunks <= total);
                    }
                }
            }
        }
    }
}
