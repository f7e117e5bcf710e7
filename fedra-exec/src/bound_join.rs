//! Bound-join batcher
//!
//! Minimizes remote round-trips by packing a block of upstream bindings
//! into one VALUES-augmented request, then correlating each returned row
//! back to its originating block entry through the synthetic row-index
//! variable. Blocks are processed strictly one at a time per task;
//! parallelism exists across sibling join/union nodes, not within one
//! batcher instance.
//!
//! Strategy selection per block is an explicit decision value, not
//! exception-driven:
//!
//! - single-entry block: plain bound request (no VALUES overhead)
//! - no shared variables between block and operand: cross product
//! - otherwise: the batched VALUES request
//!
//! A `MalformedRequest` rejection of the batched form (some non-conformant
//! endpoints choke on large VALUES blocks) retries the block on the naive
//! per-binding path; that retry happens even for silent operands because
//! the rejection indicates a construction bug, not remote data variance.

use crate::context::{FederationContext, PoolPurpose, QueryContext};
use crate::endpoint::{BindingStream, ConnectionMode, EndpointAccess, QueryOutcome};
use crate::error::{FedError, Result};
use crate::executor::{spawn_executor, ExecutorHandle, ParallelExecutor};
use crate::fallback;
use crate::operand::Operand;
use crate::query_render::{self, ROW_INDEX_VAR};
use fedra_model::BindingSet;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// Join semantics for the batcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Only enriched rows are emitted
    Inner,
    /// Block entries that matched no remote row are emitted unchanged
    /// after the batch is exhausted (OPTIONAL semantics)
    Left,
}

/// Per-evaluation parameters shared by the batcher and the fallback paths
#[derive(Clone)]
pub(crate) struct EvalParams {
    pub endpoint: Arc<dyn EndpointAccess>,
    pub conn_mode: ConnectionMode,
    pub base_uri: Option<Arc<str>>,
    pub block_size: usize,
    pub mode: JoinMode,
}

impl EvalParams {
    /// Execute a rendered request, bounded by the query deadline
    pub async fn execute(&self, query: &str, qctx: &QueryContext) -> Result<QueryOutcome> {
        qctx.bounded(
            "remote request",
            self.endpoint
                .execute(query, self.base_uri.as_deref(), self.conn_mode),
        )
        .await?
    }

    /// Execute a request that must produce rows
    pub async fn execute_rows(&self, query: &str, qctx: &QueryContext) -> Result<BindingStream> {
        match self.execute(query, qctx).await? {
            QueryOutcome::Rows(rows) => Ok(rows),
            QueryOutcome::Boolean(_) => Err(FedError::Internal(format!(
                "endpoint '{}' returned a boolean result for a row request",
                self.endpoint.id()
            ))),
        }
    }
}

/// Evaluates a join operand against one endpoint with bound-join batching
pub struct BoundJoinEvaluator {
    fctx: Arc<FederationContext>,
    endpoint: Arc<dyn EndpointAccess>,
}

impl BoundJoinEvaluator {
    pub fn new(fctx: Arc<FederationContext>, endpoint: Arc<dyn EndpointAccess>) -> Self {
        Self { fctx, endpoint }
    }

    /// Evaluate `operand` joined with the upstream `left` stream.
    ///
    /// The returned executor surfaces merged rows lazily; the work runs on
    /// the join pool.
    pub fn evaluate(
        &self,
        qctx: Arc<QueryContext>,
        operand: Operand,
        left: BindingStream,
        base_uri: Option<&str>,
    ) -> ParallelExecutor {
        self.evaluate_mode(qctx, operand, left, base_uri, JoinMode::Inner)
    }

    /// Left-join variant: unmatched upstream bindings pass through
    /// unchanged. Runs on the left-join pool.
    pub fn evaluate_left(
        &self,
        qctx: Arc<QueryContext>,
        operand: Operand,
        left: BindingStream,
        base_uri: Option<&str>,
    ) -> ParallelExecutor {
        self.evaluate_mode(qctx, operand, left, base_uri, JoinMode::Left)
    }

    fn evaluate_mode(
        &self,
        qctx: Arc<QueryContext>,
        operand: Operand,
        left: BindingStream,
        base_uri: Option<&str>,
        mode: JoinMode,
    ) -> ParallelExecutor {
        let config = self.fctx.config();
        let params = EvalParams {
            endpoint: self.endpoint.clone(),
            conn_mode: if config.fresh_connection_per_call {
                ConnectionMode::Fresh
            } else {
                ConnectionMode::Reused
            },
            base_uri: base_uri.map(Arc::from),
            block_size: config.bound_join_block_size,
            mode,
        };
        let purpose = match mode {
            JoinMode::Inner => PoolPurpose::Join,
            JoinMode::Left => PoolPurpose::LeftJoin,
        };
        spawn_executor(&self.fctx, qctx, purpose, move |handle| {
            run_blocks(params, operand, left, handle)
        })
    }
}

/// The task body: drain the left iterator block by block, evaluating each
/// block fully before the next one begins.
async fn run_blocks(
    params: EvalParams,
    operand: Operand,
    mut left: BindingStream,
    handle: ExecutorHandle,
) -> Result<()> {
    let qctx = handle.query().clone();
    loop {
        let block = next_block(&mut left, params.block_size, &qctx).await?;
        if block.is_empty() {
            return Ok(());
        }
        let block = Arc::new(block);
        let sequence = evaluate_block(&params, &operand, block, &qctx).await?;
        handle.add_result(sequence).await?;
    }
}

/// Materialize the next block (≤ `block_size` entries; `0` = everything)
async fn next_block(
    left: &mut BindingStream,
    block_size: usize,
    qctx: &QueryContext,
) -> Result<Vec<BindingSet>> {
    let mut block = Vec::new();
    loop {
        if block_size != 0 && block.len() >= block_size {
            return Ok(block);
        }
        match qctx.bounded("reading upstream bindings", left.next()).await? {
            Some(row) => block.push(row?),
            None => return Ok(block),
        }
    }
}

/// How one block will be evaluated
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum BlockStrategy {
    /// Single-entry block: plain bound request
    SingleBound,
    /// Batched VALUES request over the given relevant binding names
    BatchedValues(Vec<Arc<str>>),
    /// No shared variables: unbound request paired with every block entry
    CrossProduct,
}

pub(crate) fn choose_strategy(operand: &Operand, block: &[BindingSet]) -> BlockStrategy {
    if block.len() == 1 {
        return BlockStrategy::SingleBound;
    }
    let relevant = operand.relevant_names(block);
    if relevant.is_empty() {
        BlockStrategy::CrossProduct
    } else {
        BlockStrategy::BatchedValues(relevant)
    }
}

async fn evaluate_block(
    params: &EvalParams,
    operand: &Operand,
    block: Arc<Vec<BindingSet>>,
    qctx: &Arc<QueryContext>,
) -> Result<BindingStream> {
    match choose_strategy(operand, &block) {
        BlockStrategy::SingleBound => {
            let binding = block[0].clone();
            fallback::single_bound_sequence(params.clone(), operand.clone(), binding, qctx).await
        }
        BlockStrategy::CrossProduct => evaluate_cross_product(params, operand, block, qctx).await,
        BlockStrategy::BatchedValues(relevant) => {
            evaluate_batched(params, operand, block, &relevant, qctx).await
        }
    }
}

async fn evaluate_batched(
    params: &EvalParams,
    operand: &Operand,
    block: Arc<Vec<BindingSet>>,
    relevant: &[Arc<str>],
    qctx: &Arc<QueryContext>,
) -> Result<BindingStream> {
    let query = query_render::select_bound_join_values(operand, &block, relevant);
    match params.execute_rows(&query, qctx).await {
        Ok(rows) => Ok(correlate(rows, block, params.mode, operand.is_silent())),
        Err(err @ FedError::MalformedRequest { .. }) => {
            // Construction bug on our side or a non-conformant endpoint;
            // retried on the naive path even for silent operands.
            debug!(
                endpoint = params.endpoint.id(),
                error = %err,
                "endpoint rejected VALUES request, retrying block per-binding"
            );
            Ok(fallback::naive_block_sequence(
                params.clone(),
                operand.clone(),
                block,
                qctx.clone(),
            ))
        }
        Err(err) if operand.is_silent() && err.is_silenceable() => {
            debug!(
                endpoint = params.endpoint.id(),
                error = %err,
                "silent operand: batched request failed, passing block bindings through"
            );
            Ok(fallback::passthrough(&block))
        }
        Err(err) => Err(err),
    }
}

async fn evaluate_cross_product(
    params: &EvalParams,
    operand: &Operand,
    block: Arc<Vec<BindingSet>>,
    qctx: &Arc<QueryContext>,
) -> Result<BindingStream> {
    let query = query_render::select_unbound(operand);
    match params.execute_rows(&query, qctx).await {
        Ok(rows) => Ok(fallback::cross_product(rows, block, operand.is_silent())),
        Err(err) if operand.is_silent() && err.is_silenceable() => {
            debug!(
                endpoint = params.endpoint.id(),
                error = %err,
                "silent operand: cross-product request failed, passing block bindings through"
            );
            Ok(fallback::passthrough(&block))
        }
        Err(err) => Err(err),
    }
}

/// Read back the row-index value and validate it against the block
///
/// A missing, non-numeric or out-of-range index is a protocol violation:
/// a hard error that silent mode never swallows, since it indicates a
/// request-construction bug rather than remote data variance.
pub(crate) fn parse_row_index(row: &BindingSet, block_len: usize) -> Result<usize> {
    let term = row.get(ROW_INDEX_VAR).ok_or_else(|| {
        FedError::ProtocolViolation(format!(
            "result row is missing the ?{ROW_INDEX_VAR} correlation variable"
        ))
    })?;
    let index: usize = term.lexical().trim().parse().map_err(|_| {
        FedError::ProtocolViolation(format!(
            "non-numeric row index '{}' on result row",
            term.lexical()
        ))
    })?;
    if index >= block_len {
        return Err(FedError::ProtocolViolation(format!(
            "row index {index} out of range for block of {block_len}"
        )));
    }
    Ok(index)
}

struct CorrelateState {
    rows: Option<BindingStream>,
    block: Arc<Vec<BindingSet>>,
    matched: Vec<bool>,
    emit_index: usize,
    mode: JoinMode,
    silent: bool,
}

/// Correlate batched result rows back to their originating block entries
///
/// Each row's index selects the original binding; the merge keeps the
/// original's values on name collision (they are already-fixed upstream
/// bindings). In left mode, unmatched originals are emitted once the
/// remote stream is exhausted.
fn correlate(
    rows: BindingStream,
    block: Arc<Vec<BindingSet>>,
    mode: JoinMode,
    silent: bool,
) -> BindingStream {
    let matched = vec![false; block.len()];
    let state = CorrelateState {
        rows: Some(rows),
        block,
        matched,
        emit_index: 0,
        mode,
        silent,
    };
    Box::pin(stream::try_unfold(state, |mut st| async move {
        loop {
            let next = match st.rows.as_mut() {
                Some(rows) => rows.next().await,
                None => break,
            };
            match next {
                Some(Ok(row)) => {
                    let index = parse_row_index(&row, st.block.len())?;
                    st.matched[index] = true;
                    let merged = row.without(ROW_INDEX_VAR).merged_over(&st.block[index]);
                    return Ok(Some((merged, st)));
                }
                Some(Err(err)) if st.silent && err.is_silenceable() => {
                    debug!(error = %err, "silent operand: suppressing mid-stream remote error");
                    st.rows = None;
                }
                Some(Err(err)) => return Err(err),
                None => st.rows = None,
            }
        }
        if st.mode == JoinMode::Left {
            while st.emit_index < st.block.len() {
                let index = st.emit_index;
                st.emit_index += 1;
                if !st.matched[index] {
                    let original = st.block[index].clone();
                    return Ok(Some((original, st)));
                }
            }
        }
        Ok(None)
    }))
}
