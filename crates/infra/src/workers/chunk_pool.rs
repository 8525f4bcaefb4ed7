use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use vesselflow_events::{Delivery, Subscription, WorkQueue};

use super::{TICK, WorkerHandle};
use crate::pipeline::{ChunkWorker, HandlerOutcome};

/// A fixed set of threads competing for `process-chunk` work items.
#[derive(Debug)]
pub struct ChunkWorkerPool {
    handles: Vec<WorkerHandle>,
}

impl ChunkWorkerPool {
    /// Spawn `size` worker threads, each with its own subscription to `topic`.
    pub fn spawn(
        size: usize,
        queue: Arc<dyn WorkQueue<JsonValue>>,
        topic: &str,
        worker: Arc<ChunkWorker>,
    ) -> std::io::Result<Self> {
        let mut handles = Vec::with_capacity(size);
        for n in 0..size.max(1) {
            let name = format!("chunk-worker-{n}");
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
            let sub = queue.subscribe(topic);
            let queue = Arc::clone(&queue);
            let worker = Arc::clone(&worker);

            let thread_name = name.clone();
            let join = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&thread_name, sub, shutdown_rx, &*queue, &worker))?;
            handles.push(WorkerHandle::new(name, shutdown_tx, join));
        }

        info!(workers = handles.len(), topic, "chunk worker pool started");
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every worker and wait for in-flight chunks to finish.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown();
        }
    }
}

fn worker_loop(
    name: &str,
    sub: Subscription<Delivery<JsonValue>>,
    shutdown_rx: mpsc::Receiver<()>,
    queue: &dyn WorkQueue<JsonValue>,
    worker: &ChunkWorker,
) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(TICK) {
            Ok(delivery) => {
                let outcome = worker.handle(&delivery.payload);
                debug!(worker = name, attempt = delivery.attempt, ?outcome, "delivery handled");
                settle(name, queue, delivery, &outcome);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Ack or nack a handled delivery. Runs only after the handler returned, so a worker
/// that dies mid-chunk leaves the delivery unacknowledged for the queue to redeliver.
fn settle(name: &str, queue: &dyn WorkQueue<JsonValue>, delivery: Delivery<JsonValue>, outcome: &HandlerOutcome) {
    let settled = if outcome.should_ack() {
        queue.ack(&delivery)
    } else {
        queue.nack(delivery)
    };
    if let Err(e) = settled {
        warn!(worker = name, ?outcome, error = %e, "could not settle delivery with the queue");
    }
}
