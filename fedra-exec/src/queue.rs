//! Bounded result hand-off queue
//!
//! A fixed-capacity single-producer/single-consumer buffer carrying lazy
//! row sequences (not rows: one task emits one sequence per block). The
//! producer half blocks on `put` when the buffer is full; the consumer
//! half blocks on `next_sequence` until an item arrives, the producer
//! signals completion, or an error was tossed. Tossed errors are stored
//! out-of-band so a failing producer never blocks on a full buffer.

use crate::context::QueryContext;
use crate::endpoint::BindingStream;
use crate::error::{FedError, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

struct Shared {
    error: Mutex<Option<FedError>>,
}

impl Shared {
    fn store(&self, err: FedError) {
        let mut slot = self.error.lock().expect("queue error slot poisoned");
        *slot = Some(match slot.take() {
            // First error is the primary; later ones are chained, not dropped.
            Some(primary) => primary.chain_close_failure(err),
            None => err,
        });
    }

    fn take(&self) -> Option<FedError> {
        self.error.lock().expect("queue error slot poisoned").take()
    }
}

/// Create a bounded queue, returning its producer and consumer halves
pub(crate) fn bounded(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared {
        error: Mutex::new(None),
    });
    (
        QueueProducer {
            tx,
            shared: shared.clone(),
        },
        QueueConsumer {
            rx,
            shared,
            closed: false,
        },
    )
}

/// Producer half: held by the task thread
///
/// Completion (`done` in the protocol) is signalled by dropping the last
/// producer clone, which closes the channel.
#[derive(Clone)]
pub(crate) struct QueueProducer {
    tx: mpsc::Sender<BindingStream>,
    shared: Arc<Shared>,
}

impl QueueProducer {
    /// Enqueue a sequence; blocks while the buffer is full.
    ///
    /// Fails with [`FedError::Closed`] once the consumer has closed the
    /// queue, so an orphaned producer winds down instead of producing into
    /// the void.
    pub async fn put(&self, sequence: BindingStream) -> Result<()> {
        self.tx
            .send(sequence)
            .await
            .map_err(|_| FedError::Closed)
    }

    /// Store an error for the consumer. Never blocks; the consumer
    /// re-raises it on its next pull.
    pub fn toss(&self, err: FedError) {
        debug!(error = %err, "error tossed to result queue");
        self.shared.store(err);
    }
}

/// Consumer half: held by the pipeline thread
pub(crate) struct QueueConsumer {
    rx: mpsc::Receiver<BindingStream>,
    shared: Arc<Shared>,
    closed: bool,
}

impl QueueConsumer {
    /// Pull the next buffered sequence
    ///
    /// Returns `Ok(None)` once the producer is done and the buffer is
    /// drained. A tossed error is re-raised here, before any remaining
    /// buffered sequences are surfaced. The wait is bounded by the query
    /// deadline and never blocks forever: either an item arrives, the
    /// producer side closes, or the deadline converts the wait into
    /// [`FedError::QueryInterrupted`].
    pub async fn next_sequence(&mut self, qctx: &QueryContext) -> Result<Option<BindingStream>> {
        if self.closed {
            return Ok(None);
        }
        if let Some(err) = self.shared.take() {
            return Err(err);
        }
        match qctx.bounded("result queue wait", self.rx.recv()).await? {
            Some(sequence) => Ok(Some(sequence)),
            None => match self.shared.take() {
                Some(err) => Err(err),
                None => Ok(None),
            },
        }
    }

    /// Close the queue: rejects further puts and drops any
    /// buffered-but-undrained sequences so their backing resources are
    /// released. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(sequences = dropped, "dropped buffered sequences on queue close");
        }
    }
}
