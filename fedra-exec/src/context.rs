//! Federation and per-query execution contexts
//!
//! The [`FederationContext`] owns the worker schedulers and configuration
//! and is passed explicitly to every component at construction; there is no
//! process-wide singleton. One [`QueryContext`] exists per query evaluation
//! and carries the shared deadline plus the live-task registry used for
//! bulk cancellation.

use crate::config::FederationConfig;
use crate::error::{FedError, Result};
use crate::scheduler::ControlledWorkerScheduler;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

/// Which worker pool a task is scheduled on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPurpose {
    Join,
    Union,
    LeftJoin,
}

/// Shared state for one federation instance
///
/// Owns the three purpose-specific schedulers. The owner of the federation
/// is responsible for calling [`shutdown`](Self::shutdown) (or
/// [`abort_all`](Self::abort_all)) when done.
pub struct FederationContext {
    config: FederationConfig,
    join_scheduler: ControlledWorkerScheduler,
    union_scheduler: ControlledWorkerScheduler,
    left_join_scheduler: ControlledWorkerScheduler,
}

impl FederationContext {
    /// Create a federation context with the given configuration
    pub fn new(config: FederationConfig) -> Arc<Self> {
        Arc::new(Self {
            join_scheduler: ControlledWorkerScheduler::new(
                "join scheduler",
                config.join_worker_threads,
            ),
            union_scheduler: ControlledWorkerScheduler::new(
                "union scheduler",
                config.union_worker_threads,
            ),
            left_join_scheduler: ControlledWorkerScheduler::new(
                "left-join scheduler",
                config.left_join_worker_threads,
            ),
            config,
        })
    }

    /// The federation configuration
    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// The scheduler serving the given pool purpose
    pub fn scheduler(&self, purpose: PoolPurpose) -> &ControlledWorkerScheduler {
        match purpose {
            PoolPurpose::Join => &self.join_scheduler,
            PoolPurpose::Union => &self.union_scheduler,
            PoolPurpose::LeftJoin => &self.left_join_scheduler,
        }
    }

    /// Begin a query evaluation: establishes the query's deadline from
    /// `max_query_time` and a fresh task registry.
    pub fn begin_query(&self) -> Arc<QueryContext> {
        QueryContext::with_deadline(self.config.max_query_time.map(|d| Instant::now() + d))
    }

    /// Drain all pools, waiting up to the configured grace period for
    /// in-flight tasks to finish normally, then aborting stragglers.
    pub async fn shutdown(&self) {
        let grace = self.config.shutdown_grace;
        self.join_scheduler.shutdown(grace).await;
        self.union_scheduler.shutdown(grace).await;
        self.left_join_scheduler.shutdown(grace).await;
    }

    /// Abort in-flight tasks on all pools immediately
    pub fn abort_all(&self) {
        self.join_scheduler.abort();
        self.union_scheduler.abort();
        self.left_join_scheduler.abort();
    }
}

/// Per-query execution state: shared deadline plus cancellation registry
///
/// Every task spawned on behalf of the query registers its abort handle
/// here before it is scheduled, so [`cancel`](Self::cancel) reaches work
/// that has not yet started.
pub struct QueryContext {
    deadline: Option<Instant>,
    tasks: Mutex<Vec<AbortHandle>>,
    cancelled: AtomicBool,
}

impl QueryContext {
    /// Create a query context with an optional absolute deadline
    pub fn with_deadline(deadline: Option<Instant>) -> Arc<Self> {
        Arc::new(Self {
            deadline,
            tasks: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Unbounded query context (no deadline); used by callers that manage
    /// their own budget.
    pub fn unbounded() -> Arc<Self> {
        Self::with_deadline(None)
    }

    /// The absolute deadline, if enforcement is enabled
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Remaining time budget
    ///
    /// `Ok(None)` means unbounded. An elapsed deadline is reported as
    /// [`FedError::QueryInterrupted`], so callers checking the budget
    /// before a blocking wait fail the same way as callers that waited.
    pub fn remaining(&self, while_doing: &str) -> Result<Option<std::time::Duration>> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    Err(FedError::QueryInterrupted(while_doing.to_string()))
                } else {
                    Ok(Some(deadline - now))
                }
            }
        }
    }

    /// Run a future bounded by the remaining query time
    ///
    /// A wait that outlives the deadline is converted into
    /// [`FedError::QueryInterrupted`] naming the suspension point, never a
    /// generic timeout, so the outer pipeline can distinguish "ran out of
    /// time" from "something is broken".
    pub async fn bounded<T, F>(&self, while_doing: &str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        match self.deadline {
            None => Ok(fut.await),
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| FedError::QueryInterrupted(while_doing.to_string())),
        }
    }

    /// Register a task spawned for this query so bulk cancellation can
    /// reach it. Called before the task starts running.
    pub fn register_task(&self, handle: AbortHandle) {
        let mut tasks = self.tasks.lock().expect("task registry poisoned");
        // Keep the registry from growing without bound on long queries.
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// True once the query has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancel the query: aborts every registered task. Idempotent.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let tasks = {
            let mut guard = self.tasks.lock().expect("task registry poisoned");
            std::mem::take(&mut *guard)
        };
        let live = tasks.iter().filter(|h| !h.is_finished()).count();
        if live > 0 {
            debug!(tasks = live, "cancelling query tasks");
        }
        for handle in tasks {
            handle.abort();
        }
    }
}
