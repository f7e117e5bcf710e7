//! Controlled worker scheduler
//!
//! A named, fixed-size worker pool with an unbounded submission queue.
//! Scheduling never blocks the caller: the task is spawned immediately and
//! waits inside for a worker permit. Task-body failures never reach the
//! pool; the executor wiring routes them to the owning executor's `toss`
//! before the task body ever gets here.

use crate::context::QueryContext;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{info, warn};

/// Fixed-size worker pool for one scheduling purpose (join, union, ...)
pub struct ControlledWorkerScheduler {
    name: &'static str,
    permits: Arc<Semaphore>,
    workers: usize,
    live: Mutex<Vec<JoinHandle<()>>>,
}

impl ControlledWorkerScheduler {
    /// Create a scheduler with `workers` concurrent task slots
    pub fn new(name: &'static str, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            name,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            live: Mutex::new(Vec::new()),
        }
    }

    /// Configured worker count
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of submitted tasks that have not yet completed
    pub fn in_flight(&self) -> usize {
        let mut live = self.live.lock().expect("scheduler registry poisoned");
        live.retain(|h| !h.is_finished());
        live.len()
    }

    /// Submit a task for asynchronous execution
    ///
    /// Returns immediately; the task waits inside for a worker permit. The
    /// task is registered with `qctx` before it can run, so query-level
    /// cancellation reaches work that has not started yet. The returned
    /// abort handle additionally lets the owning executor cancel just its
    /// own task.
    pub fn schedule<F>(&self, qctx: &QueryContext, task: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            // Closed semaphore means the pool was shut down; drop the task.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
        let abort = handle.abort_handle();
        qctx.register_task(abort.clone());

        let mut live = self.live.lock().expect("scheduler registry poisoned");
        live.retain(|h| !h.is_finished());
        live.push(handle);
        abort
    }

    /// Graceful shutdown: stop admitting tasks, wait up to `grace` for
    /// in-flight tasks to finish, then abort stragglers.
    pub async fn shutdown(&self, grace: Duration) {
        self.permits.close();
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if self.in_flight() == 0 {
                info!(scheduler = self.name, "scheduler drained");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let remaining = self.in_flight();
        warn!(
            scheduler = self.name,
            tasks = remaining,
            "grace period elapsed, aborting in-flight tasks"
        );
        self.abort();
    }

    /// Abort all in-flight tasks immediately (best-effort interruption)
    pub fn abort(&self) {
        let handles = {
            let mut live = self.live.lock().expect("scheduler registry poisoned");
            std::mem::take(&mut *live)
        };
        for handle in handles {
            handle.abort();
        }
    }
}
