use std::collections::{BTreeSet, HashMap};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use vesselflow_core::{Applied, Job, JobId, JobTransition};
use vesselflow_events::Subscription;

use super::JobStore;
use crate::error::StoreError;

#[derive(Debug)]
struct JobEntry {
    job: Job,
    /// Chunk indices already counted into `processed_chunks`.
    counted: BTreeSet<u32>,
}

/// In-memory job store for tests/dev.
///
/// Each atomic primitive runs under one write lock, which is what makes the
/// marker-then-increment of a chunk a single step.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    watchers: Mutex<Vec<Sender<Job>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn notify(&self, job: &Job) {
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.retain(|tx| tx.send(job.clone()).is_ok());
        }
    }

    fn mutate<F>(&self, job_id: JobId, f: F) -> Result<Applied, StoreError>
    where
        F: FnOnce(&mut JobEntry) -> Result<Applied, StoreError>,
    {
        let snapshot = {
            let mut jobs = self
                .jobs
                .write()
                .map_err(|_| StoreError::storage("job store lock poisoned"))?;
            let entry = jobs.get_mut(&job_id).ok_or(StoreError::JobNotFound(job_id))?;

            // Apply against a copy so a rejected change leaves the document untouched.
            let mut draft = JobEntry {
                job: entry.job.clone(),
                counted: entry.counted.clone(),
            };
            if !f(&mut draft)?.changed() {
                return Ok(Applied::Unchanged);
            }
            *entry = draft;
            entry.job.clone()
        };

        self.notify(&snapshot);
        Ok(Applied::Changed)
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job: Job) -> Result<Job, StoreError> {
        {
            let mut jobs = self
                .jobs
                .write()
                .map_err(|_| StoreError::storage("job store lock poisoned"))?;
            if jobs.contains_key(&job.id) {
                return Err(StoreError::AlreadyExists(job.id));
            }
            jobs.insert(
                job.id,
                JobEntry {
                    job: job.clone(),
                    counted: BTreeSet::new(),
                },
            );
        }

        self.notify(&job);
        Ok(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| StoreError::storage("job store lock poisoned"))?;
        Ok(jobs.get(&job_id).map(|e| e.job.clone()))
    }

    fn apply(&self, job_id: JobId, transition: &JobTransition) -> Result<Applied, StoreError> {
        self.mutate(job_id, |entry| Ok(entry.job.apply(transition)?))
    }

    fn record_chunk_processed(&self, job_id: JobId, chunk_index: u32) -> Result<Applied, StoreError> {
        self.mutate(job_id, |entry| {
            entry.job.accepts_chunk(chunk_index)?;
            if !entry.counted.insert(chunk_index) {
                debug!(%job_id, chunk_index, "chunk already counted");
                return Ok(Applied::Unchanged);
            }
            entry.job.processed_chunks += 1;
            Ok(Applied::Changed)
        })
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| StoreError::storage("job store lock poisoned"))?;
        let mut all: Vec<Job> = jobs.values().map(|e| e.job.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    fn subscribe(&self) -> Subscription<Job> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.push(tx);
        }
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vesselflow_core::{DomainError, JobStatus};

    fn processing_job(store: &InMemoryJobStore, chunks: u32) -> JobId {
        let job = store.create(Job::new("uploads/ais.csv")).unwrap();
        for to in [JobStatus::Preprocessing, JobStatus::Splitting] {
            store.apply(job.id, &JobTransition::Advance { to }).unwrap();
        }
        store
            .apply(
                job.id,
                &JobTransition::SplitCompleted {
                    chunk_count: chunks,
                    vessel_count: chunks * 10,
                },
            )
            .unwrap();
        job.id
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = store.create(Job::new("uploads/a.csv")).unwrap();
        assert!(matches!(store.create(job), Err(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn each_chunk_is_counted_once() {
        let store = InMemoryJobStore::new();
        let id = processing_job(&store, 3);

        assert_eq!(store.record_chunk_processed(id, 1).unwrap(), Applied::Changed);
        assert_eq!(store.record_chunk_processed(id, 1).unwrap(), Applied::Unchanged);
        assert_eq!(store.get(id).unwrap().unwrap().processed_chunks, 1);
    }

    #[test]
    fn out_of_range_chunk_is_rejected_without_counting() {
        let store = InMemoryJobStore::new();
        let id = processing_job(&store, 2);

        let err = store.record_chunk_processed(id, 2).unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::InvariantViolation(_))));
        assert_eq!(store.get(id).unwrap().unwrap().processed_chunks, 0);
    }

    #[test]
    fn rejected_transition_leaves_document_untouched() {
        let store = InMemoryJobStore::new();
        let job = store.create(Job::new("uploads/a.csv")).unwrap();

        let err = store
            .apply(
                job.id,
                &JobTransition::SplitCompleted {
                    chunk_count: 1,
                    vessel_count: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(_)));
        assert_eq!(store.get(job.id).unwrap().unwrap(), job);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        assert!(store.get(JobId::new()).unwrap().is_none());
        assert!(matches!(
            store.record_chunk_processed(JobId::new(), 0),
            Err(StoreError::JobNotFound(_))
        ));
    }

    #[test]
    fn list_returns_newest_first() {
        let store = InMemoryJobStore::new();
        let mut older = Job::new("uploads/old.csv");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let older = store.create(older).unwrap();
        let newer = store.create(Job::new("uploads/new.csv")).unwrap();
        store
            .apply(older.id, &JobTransition::Fail { message: "bad csv".into() })
            .unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.iter().map(|j| j.id).collect::<Vec<_>>(), vec![newer.id, older.id]);
        assert_eq!(listed[1].status, JobStatus::Error);
        assert!(InMemoryJobStore::new().list().unwrap().is_empty());
    }

    #[test]
    fn subscribers_see_changes_but_not_no_ops() {
        let store = InMemoryJobStore::new();
        let sub = store.subscribe();
        let id = processing_job(&store, 1);

        // create + 2 advances + split
        assert_eq!(std::iter::from_fn(|| sub.try_recv().ok()).count(), 4);

        store.record_chunk_processed(id, 0).unwrap();
        store.record_chunk_processed(id, 0).unwrap();
        let seen: Vec<Job> = std::iter::from_fn(|| sub.try_recv().ok()).collect();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].processed_chunks, 1);

        store.apply(id, &JobTransition::Complete { at: Utc::now() }).unwrap();
        store.apply(id, &JobTransition::Complete { at: Utc::now() }).unwrap();
        let seen: Vec<Job> = std::iter::from_fn(|| sub.try_recv().ok()).collect();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].status, JobStatus::Completed);
    }

    #[test]
    fn concurrent_duplicates_never_overcount() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = processing_job(&store, 4);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.record_chunk_processed(id, i % 4).unwrap())
            })
            .collect();
        let changed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|a| a.changed())
            .count();

        assert_eq!(changed, 4);
        assert_eq!(store.get(id).unwrap().unwrap().processed_chunks, 4);
    }
}
