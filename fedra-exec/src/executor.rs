//! Parallel executor: the consumer/producer pair around one result queue
//!
//! One executor exists per join/union/service node instance. The producer
//! side runs as a single task on a worker pool and reports sequences (or
//! an error) through an [`ExecutorHandle`]; the consumer side hands rows
//! to the enclosing pipeline lazily, draining sequences in FIFO order.
//!
//! There is no executor class hierarchy: [`spawn_executor`] takes the
//! "handle bindings" strategy as an async function, and everything else is
//! shared machinery.

use crate::context::{FederationContext, PoolPurpose, QueryContext};
use crate::endpoint::BindingStream;
use crate::error::{FedError, Result};
use crate::queue::{self, QueueConsumer, QueueProducer};
use fedra_model::BindingSet;
use futures::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::AbortHandle;

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const ABORTED: u8 = 3;

pub(crate) struct ExecControl {
    state: AtomicU8,
}

impl ExecControl {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(CREATED),
        }
    }

    fn mark_running(&self) {
        let _ = self
            .state
            .compare_exchange(CREATED, RUNNING, Ordering::AcqRel, Ordering::Acquire);
    }

    fn mark_finished(&self) {
        // Aborted wins over finished; anything else transitions.
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s != ABORTED).then_some(FINISHED)
            });
    }

    fn mark_aborted(&self) {
        self.state.store(ABORTED, Ordering::Release);
    }

    fn is_aborted(&self) -> bool {
        self.state.load(Ordering::Acquire) == ABORTED
    }

    fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) >= FINISHED
    }
}

/// Producer-side handle given to the task body
///
/// Cloneable; the queue is completed ("done") when the last clone drops.
#[derive(Clone)]
pub struct ExecutorHandle {
    control: Arc<ExecControl>,
    producer: QueueProducer,
    qctx: Arc<QueryContext>,
}

impl ExecutorHandle {
    /// Report one result sequence; rows surface to the consumer in the
    /// order sequences were added. Blocks while the queue is full, bounded
    /// by the query deadline.
    pub async fn add_result(&self, sequence: BindingStream) -> Result<()> {
        if self.control.is_aborted() {
            return Err(FedError::Closed);
        }
        self.qctx
            .bounded("result hand-off", self.producer.put(sequence))
            .await?
    }

    /// Route a task-side failure to the consumer. Never blocks; the
    /// consumer re-raises the error on its next pull.
    pub fn toss(&self, err: FedError) {
        self.producer.toss(err);
    }

    /// The query context this executor's task runs under
    pub fn query(&self) -> &Arc<QueryContext> {
        &self.qctx
    }
}

/// Spawn a producer task on the given pool and return the consumer-side
/// executor.
///
/// The task body receives an [`ExecutorHandle`]; any `Err` it returns is
/// tossed to the consumer rather than lost on the pool, and completion is
/// signalled in all cases.
pub fn spawn_executor<F, Fut>(
    fctx: &FederationContext,
    qctx: Arc<QueryContext>,
    purpose: PoolPurpose,
    body: F,
) -> ParallelExecutor
where
    F: FnOnce(ExecutorHandle) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let (producer, consumer) = queue::bounded(fctx.config().result_queue_capacity);
    let control = Arc::new(ExecControl::new());
    let handle = ExecutorHandle {
        control: control.clone(),
        producer,
        qctx: qctx.clone(),
    };

    let task_control = control.clone();
    let abort = fctx.scheduler(purpose).schedule(&qctx, async move {
        task_control.mark_running();
        if let Err(err) = body(handle.clone()).await {
            handle.toss(err);
        }
        task_control.mark_finished();
        // `handle` drops here: the last producer clone closes the queue,
        // signalling done to the consumer.
    });

    ParallelExecutor {
        control,
        consumer,
        current: None,
        qctx,
        task: Some(abort),
    }
}

/// Consumer-side executor: lazy merged row stream for one pipeline node
pub struct ParallelExecutor {
    control: Arc<ExecControl>,
    consumer: QueueConsumer,
    current: Option<BindingStream>,
    qctx: Arc<QueryContext>,
    task: Option<AbortHandle>,
}

impl ParallelExecutor {
    /// Pull the next merged row
    ///
    /// Drains the current sequence, then the next buffered sequence, in
    /// FIFO order. Returns `Ok(None)` once the producer is done and all
    /// sequences are exhausted, or after [`close`](Self::close). A tossed
    /// or in-stream error is raised exactly once; the executor discards
    /// the failed sequence afterwards.
    pub async fn next_row(&mut self) -> Result<Option<BindingSet>> {
        if self.control.is_aborted() {
            return Ok(None);
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                match self.qctx.bounded("row wait", current.next()).await? {
                    Some(Ok(row)) => return Ok(Some(row)),
                    Some(Err(err)) => {
                        self.current = None;
                        return Err(err);
                    }
                    None => self.current = None,
                }
            } else {
                match self.consumer.next_sequence(&self.qctx).await? {
                    Some(sequence) => self.current = Some(sequence),
                    None => return Ok(None),
                }
            }
        }
    }

    /// Drain all remaining rows into a vector
    pub async fn collect_rows(&mut self) -> Result<Vec<BindingSet>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// True once the producer task has completed, normally or via abort
    pub fn is_finished(&self) -> bool {
        self.control.is_finished()
    }

    /// Close the executor: marks it aborted, closes the queue (releasing
    /// buffered sequences), drops the live right-hand sequence and aborts
    /// the producer task (which owns and thereby releases the upstream
    /// left iterator). Safe to call at any point; calling it twice is a
    /// no-op.
    pub fn close(&mut self) {
        self.control.mark_aborted();
        self.consumer.close();
        self.current = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ParallelExecutor {
    fn drop(&mut self) {
        self.close();
    }
}
