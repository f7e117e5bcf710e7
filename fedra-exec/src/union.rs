//! Union evaluation
//!
//! A union node evaluates each of its operand arms against that arm's
//! endpoint and surfaces all rows as one FIFO sequence. One producer task
//! runs the arms sequentially; parallelism exists across sibling pipeline
//! nodes sharing the union pool, not within one union. A silent arm
//! suppresses its own remote failures without disturbing the other arms.

use crate::bound_join::{EvalParams, JoinMode};
use crate::context::{FederationContext, PoolPurpose, QueryContext};
use crate::endpoint::{BindingStream, ConnectionMode, EndpointAccess};
use crate::error::Result;
use crate::executor::{spawn_executor, ExecutorHandle, ParallelExecutor};
use crate::operand::Operand;
use crate::query_render;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// One arm of a union: an operand and the endpoint it runs against
pub struct UnionArm {
    pub operand: Operand,
    pub endpoint: Arc<dyn EndpointAccess>,
}

impl UnionArm {
    pub fn new(operand: Operand, endpoint: Arc<dyn EndpointAccess>) -> Self {
        Self { operand, endpoint }
    }
}

/// Evaluates union nodes on the union pool
pub struct UnionEvaluator {
    fctx: Arc<FederationContext>,
}

impl UnionEvaluator {
    pub fn new(fctx: Arc<FederationContext>) -> Self {
        Self { fctx }
    }

    /// Evaluate the arms and return the consumer-side executor over the
    /// combined row sequence (arm order preserved).
    pub fn evaluate(
        &self,
        qctx: Arc<QueryContext>,
        arms: Vec<UnionArm>,
        base_uri: Option<&str>,
    ) -> ParallelExecutor {
        let config = self.fctx.config();
        let conn_mode = if config.fresh_connection_per_call {
            ConnectionMode::Fresh
        } else {
            ConnectionMode::Reused
        };
        let block_size = config.bound_join_block_size;
        let base: Option<Arc<str>> = base_uri.map(Arc::from);
        spawn_executor(&self.fctx, qctx, PoolPurpose::Union, move |handle| {
            run_arms(arms, conn_mode, base, block_size, handle)
        })
    }
}

async fn run_arms(
    arms: Vec<UnionArm>,
    conn_mode: ConnectionMode,
    base_uri: Option<Arc<str>>,
    block_size: usize,
    handle: ExecutorHandle,
) -> Result<()> {
    let qctx = handle.query().clone();
    for arm in arms {
        let silent = arm.operand.is_silent();
        let params = EvalParams {
            endpoint: arm.endpoint,
            conn_mode,
            base_uri: base_uri.clone(),
            block_size,
            mode: JoinMode::Inner,
        };
        let query = query_render::select_unbound(&arm.operand);
        match params.execute_rows(&query, &qctx).await {
            Ok(rows) => {
                let rows = if silent {
                    suppress_silenceable(rows)
                } else {
                    rows
                };
                handle.add_result(rows).await?;
            }
            Err(err) if silent && err.is_silenceable() => {
                debug!(
                    endpoint = params.endpoint.id(),
                    error = %err,
                    "silent union arm failed, skipping"
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// End the sequence quietly on the first suppressible remote error
fn suppress_silenceable(rows: BindingStream) -> BindingStream {
    let state = Some(rows);
    Box::pin(stream::try_unfold(state, |mut st| async move {
        let next = match st.as_mut() {
            Some(rows) => rows.next().await,
            None => return Ok(None),
        };
        match next {
            Some(Ok(row)) => Ok(Some((row, st))),
            Some(Err(err)) if err.is_silenceable() => {
                debug!(error = %err, "silent union arm: suppressing mid-stream remote error");
                Ok(None)
            }
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }))
}
