use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::{TICK, WorkerHandle};
use crate::job_store::JobStore;
use crate::pipeline::CompletionDetector;

/// Runs the completion detector on every job document change, and sweeps every
/// `processing` job each `sweep_every` for changes the subscription never delivered.
#[derive(Debug)]
pub struct CompletionWatcher;

impl CompletionWatcher {
    pub fn spawn(
        jobs: &dyn JobStore,
        detector: Arc<CompletionDetector>,
        sweep_every: Duration,
    ) -> std::io::Result<WorkerHandle> {
        let name = "completion-watcher".to_string();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let mut sub = Some(jobs.subscribe());

        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            let mut last_sweep = Instant::now();
            loop {
                if last_sweep.elapsed() >= sweep_every {
                    match detector.sweep() {
                        Ok(0) => {}
                        Ok(n) => info!(finalized = n, "completion sweep finalized jobs"),
                        Err(err) => warn!(error = %err, "completion sweep failed"),
                    }
                    last_sweep = Instant::now();
                }

                let Some(changes) = sub.as_ref() else {
                    // Only the sweep is left; wait on shutdown instead.
                    match shutdown_rx.recv_timeout(TICK) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                };
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                match changes.recv_timeout(TICK) {
                    Ok(job) => {
                        if let Err(err) = detector.on_job_changed(&job) {
                            warn!(job_id = %job.id, error = %err, "completion check failed");
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        error!("job change subscription closed, completion now relies on the sweep");
                        sub = None;
                    }
                }
            }
            debug!("completion watcher stopped");
        })?;

        Ok(WorkerHandle::new(name, shutdown_tx, join))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesselflow_core::{Applied, Job, JobId, JobStatus, JobTransition};
    use vesselflow_events::Subscription;

    use crate::error::StoreError;
    use crate::job_store::InMemoryJobStore;

    /// Job store whose change subscription is closed from the start.
    struct SilentJobStore {
        inner: Arc<InMemoryJobStore>,
    }

    impl JobStore for SilentJobStore {
        fn create(&self, job: Job) -> Result<Job, StoreError> {
            self.inner.create(job)
        }

        fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
            self.inner.get(job_id)
        }

        fn apply(&self, job_id: JobId, transition: &JobTransition) -> Result<Applied, StoreError> {
            self.inner.apply(job_id, transition)
        }

        fn record_chunk_processed(&self, job_id: JobId, chunk_index: u32) -> Result<Applied, StoreError> {
            self.inner.record_chunk_processed(job_id, chunk_index)
        }

        fn list(&self) -> Result<Vec<Job>, StoreError> {
            self.inner.list()
        }

        fn subscribe(&self) -> Subscription<Job> {
            let (_tx, rx) = mpsc::channel();
            Subscription::new(rx)
        }
    }

    fn ready_job(jobs: &InMemoryJobStore) -> JobId {
        let job = jobs.create(Job::new("uploads/ais.csv")).unwrap();
        for to in [JobStatus::Preprocessing, JobStatus::Splitting] {
            jobs.apply(job.id, &JobTransition::Advance { to }).unwrap();
        }
        jobs.apply(
            job.id,
            &JobTransition::SplitCompleted {
                chunk_count: 1,
                vessel_count: 1,
            },
        )
        .unwrap();
        jobs.record_chunk_processed(job.id, 0).unwrap();
        job.id
    }

    #[test]
    fn sweep_completes_jobs_whose_notifications_were_lost() {
        let inner = InMemoryJobStore::arc();
        let store = Arc::new(SilentJobStore { inner: inner.clone() });
        let detector = Arc::new(CompletionDetector::new(store.clone()));
        let watcher = CompletionWatcher::spawn(&*store, detector, Duration::from_millis(50)).unwrap();

        let id = ready_job(&inner);
        let deadline = Instant::now() + Duration::from_secs(5);
        while inner.get(id).unwrap().unwrap().status != JobStatus::Completed && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(inner.get(id).unwrap().unwrap().status, JobStatus::Completed);

        // A closed subscription no longer ends the watcher; shutdown still does.
        watcher.shutdown();
    }

    #[test]
    fn change_notifications_complete_jobs_between_sweeps() {
        let jobs = InMemoryJobStore::arc();
        let detector = Arc::new(CompletionDetector::new(jobs.clone()));
        let watcher = CompletionWatcher::spawn(&*jobs, detector, Duration::from_secs(3600)).unwrap();

        let id = ready_job(&jobs);
        let deadline = Instant::now() + Duration::from_secs(5);
        while jobs.get(id).unwrap().unwrap().status != JobStatus::Completed && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        watcher.shutdown();
        assert_eq!(jobs.get(id).unwrap().unwrap().status, JobStatus::Completed);
    }
}
