//! SERVICE clause evaluation
//!
//! A SERVICE call is evaluated as one materialized batch: the work is
//! scheduled on the union pool and the calling pipeline blocks on a
//! one-shot latch until the batch is ready, bounded by the remaining
//! query time. With `enable_service_as_bound_join` set (the default) the
//! inner evaluation reuses the bound-join batcher; otherwise the input
//! bindings are evaluated one request each on the naive path.

use crate::bound_join::{BoundJoinEvaluator, EvalParams, JoinMode};
use crate::context::{FederationContext, PoolPurpose, QueryContext};
use crate::endpoint::{stream_from_rows, ConnectionMode, EndpointAccess};
use crate::error::{FedError, Result};
use crate::operand::Operand;
use fedra_model::BindingSet;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Evaluates a SERVICE operand against its target endpoint
pub struct ServiceEvaluator {
    fctx: Arc<FederationContext>,
    endpoint: Arc<dyn EndpointAccess>,
}

impl ServiceEvaluator {
    pub fn new(fctx: Arc<FederationContext>, endpoint: Arc<dyn EndpointAccess>) -> Self {
        Self { fctx, endpoint }
    }

    /// Evaluate the SERVICE operand over `input`, returning the fully
    /// materialized batch of enriched bindings.
    ///
    /// The evaluation runs on the union pool; this call suspends on the
    /// result latch and raises `QueryInterrupted` if the query deadline
    /// elapses first. A silent operand degrades to passing `input`
    /// through unchanged when the endpoint fails.
    pub async fn evaluate(
        &self,
        qctx: Arc<QueryContext>,
        operand: Operand,
        input: Vec<BindingSet>,
        base_uri: Option<&str>,
    ) -> Result<Vec<BindingSet>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let silent = operand.is_silent();
        let (tx, rx) = oneshot::channel::<Result<Vec<BindingSet>>>();

        let fctx = self.fctx.clone();
        let endpoint = self.endpoint.clone();
        let task_qctx = qctx.clone();
        let task_input = input.clone();
        let base: Option<Arc<str>> = base_uri.map(Arc::from);
        self.fctx.scheduler(PoolPurpose::Union).schedule(&qctx, async move {
            let batch = evaluate_batch(fctx, task_qctx, endpoint, operand, task_input, base).await;
            // The consumer may have abandoned the latch on interrupt.
            let _ = tx.send(batch);
        });

        let outcome = qctx.bounded("waiting for SERVICE results", rx).await?;
        let batch = outcome
            .map_err(|_| FedError::Internal("SERVICE task dropped its result latch".into()))?;
        match batch {
            Ok(rows) => Ok(rows),
            Err(err) if silent && err.is_silenceable() => {
                debug!(error = %err, "silent SERVICE: passing input bindings through");
                Ok(input)
            }
            Err(err) => Err(err),
        }
    }
}

/// The pool-side body: produce the whole batch for the latch
async fn evaluate_batch(
    fctx: Arc<FederationContext>,
    qctx: Arc<QueryContext>,
    endpoint: Arc<dyn EndpointAccess>,
    operand: Operand,
    input: Vec<BindingSet>,
    base_uri: Option<Arc<str>>,
) -> Result<Vec<BindingSet>> {
    let config = fctx.config();
    if config.enable_service_as_bound_join {
        let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint);
        let mut executor = evaluator.evaluate(
            qctx,
            operand,
            stream_from_rows(input),
            base_uri.as_deref(),
        );
        executor.collect_rows().await
    } else {
        let params = EvalParams {
            endpoint,
            conn_mode: if config.fresh_connection_per_call {
                ConnectionMode::Fresh
            } else {
                ConnectionMode::Reused
            },
            base_uri,
            block_size: config.bound_join_block_size,
            mode: JoinMode::Inner,
        };
        crate::fallback::naive_block_sequence(params, operand, Arc::new(input), qctx)
            .try_collect()
            .await
    }
}
