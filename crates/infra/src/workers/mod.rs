//! Background worker threads.

pub mod chunk_pool;
pub mod completion_watcher;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub use chunk_pool::ChunkWorkerPool;
pub use completion_watcher::CompletionWatcher;

/// How long a worker blocks on its subscription before checking for shutdown.
pub(crate) const TICK: Duration = Duration::from_millis(250);

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn new(name: String, shutdown: mpsc::Sender<()>, join: thread::JoinHandle<()>) -> Self {
        Self {
            name,
            shutdown,
            join: Some(join),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}
