//! Fallback evaluation paths
//!
//! Everything the batcher cannot (or should not) do with one VALUES
//! request lands here:
//!
//! - the naive per-binding path, used when an endpoint rejects the batched
//!   request and as the single-entry block evaluation
//! - the cross-product expansion when block and operand share no variables
//! - the silent pass-through sequence that keeps a failing endpoint from
//!   aborting the whole query
//!
//! All sequences are lazy: remote requests on the per-binding path are
//! issued as the consumer pulls, one binding at a time, preserving block
//! order.

use crate::bound_join::{EvalParams, JoinMode};
use crate::context::QueryContext;
use crate::endpoint::{empty_stream, stream_from_rows, BindingStream, QueryOutcome};
use crate::error::{FedError, Result};
use crate::operand::Operand;
use crate::query_render;
use fedra_model::BindingSet;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// The unenriched input bindings, as a sequence
///
/// Emitted in place of remote results when a silent operand's endpoint
/// fails: the query degrades as if the endpoint had returned nothing,
/// losing no upstream rows.
pub(crate) fn passthrough(block: &[BindingSet]) -> BindingStream {
    stream_from_rows(block.to_vec())
}

/// Evaluate a single upstream binding with a plain bound request
///
/// The binding's values are substituted directly into the operand (no
/// VALUES clause). If the substitution leaves no free variable, an ASK
/// request is issued instead: `true` passes the binding through, `false`
/// drops it.
pub(crate) async fn single_bound_sequence(
    params: EvalParams,
    operand: Operand,
    binding: BindingSet,
    qctx: &QueryContext,
) -> Result<BindingStream> {
    let silent = operand.is_silent();
    if operand.free_vars_after(&binding).is_empty() {
        let query = query_render::ask_bound(&operand, &binding);
        return match params.execute(&query, qctx).await {
            Ok(QueryOutcome::Boolean(true)) => Ok(stream_from_rows(vec![binding])),
            Ok(QueryOutcome::Boolean(false)) => Ok(if params.mode == JoinMode::Left {
                stream_from_rows(vec![binding])
            } else {
                empty_stream()
            }),
            Ok(QueryOutcome::Rows(_)) => Err(FedError::Internal(format!(
                "endpoint '{}' returned rows for an ASK request",
                params.endpoint.id()
            ))),
            Err(err) if silent && err.is_silenceable() => {
                debug!(
                    endpoint = params.endpoint.id(),
                    error = %err,
                    "silent operand: bound check failed, passing binding through"
                );
                Ok(stream_from_rows(vec![binding]))
            }
            Err(err) => Err(err),
        };
    }

    let query = query_render::select_bound(&operand, &binding);
    match params.execute_rows(&query, qctx).await {
        Ok(rows) => Ok(merge_with_base(rows, binding, params.mode, silent)),
        Err(err) if silent && err.is_silenceable() => {
            debug!(
                endpoint = params.endpoint.id(),
                error = %err,
                "silent operand: bound request failed, passing binding through"
            );
            Ok(stream_from_rows(vec![binding]))
        }
        Err(err) => Err(err),
    }
}

/// Naive per-binding evaluation of a whole block, in block order
///
/// Requests are issued lazily, one binding at a time, as the consumer
/// pulls. This is the retry path after a rejected VALUES request and the
/// universal fallback when batching is disabled for an operand.
pub(crate) fn naive_block_sequence(
    params: EvalParams,
    operand: Operand,
    block: Arc<Vec<BindingSet>>,
    qctx: Arc<QueryContext>,
) -> BindingStream {
    struct State {
        params: EvalParams,
        operand: Operand,
        block: Arc<Vec<BindingSet>>,
        qctx: Arc<QueryContext>,
        index: usize,
        current: Option<BindingStream>,
    }
    let state = State {
        params,
        operand,
        block,
        qctx,
        index: 0,
        current: None,
    };
    Box::pin(stream::try_unfold(state, |mut st| async move {
        loop {
            let next = match st.current.as_mut() {
                Some(current) => current.next().await,
                None => {
                    if st.index >= st.block.len() {
                        return Ok(None);
                    }
                    let binding = st.block[st.index].clone();
                    st.index += 1;
                    let sequence = single_bound_sequence(
                        st.params.clone(),
                        st.operand.clone(),
                        binding,
                        &st.qctx,
                    )
                    .await?;
                    st.current = Some(sequence);
                    continue;
                }
            };
            match next {
                Some(Ok(row)) => return Ok(Some((row, st))),
                Some(Err(err)) => return Err(err),
                None => st.current = None,
            }
        }
    }))
}

/// Pair every remote row with every block entry (Cartesian expansion)
///
/// Used when the relevant-binding-name set is empty: the unbound request
/// runs once and each returned row is merged with each block binding,
/// original values winning on collision.
pub(crate) fn cross_product(
    rows: BindingStream,
    block: Arc<Vec<BindingSet>>,
    silent: bool,
) -> BindingStream {
    struct State {
        rows: Option<BindingStream>,
        block: Arc<Vec<BindingSet>>,
        pending: Option<BindingSet>,
        index: usize,
        silent: bool,
    }
    let state = State {
        rows: Some(rows),
        block,
        pending: None,
        index: 0,
        silent,
    };
    Box::pin(stream::try_unfold(state, |mut st| async move {
        loop {
            if let Some(row) = st.pending.as_ref() {
                if st.index < st.block.len() {
                    let merged = row.merged_over(&st.block[st.index]);
                    st.index += 1;
                    return Ok(Some((merged, st)));
                }
                st.pending = None;
                st.index = 0;
            }
            let next = match st.rows.as_mut() {
                Some(rows) => rows.next().await,
                None => return Ok(None),
            };
            match next {
                Some(Ok(row)) => st.pending = Some(row),
                Some(Err(err)) if st.silent && err.is_silenceable() => {
                    debug!(error = %err, "silent operand: suppressing mid-stream remote error");
                    st.rows = None;
                }
                Some(Err(err)) => return Err(err),
                None => st.rows = None,
            }
        }
    }))
}

/// Merge each remote row over a fixed upstream binding
///
/// In left mode an upstream binding that produced no merged row is
/// emitted unchanged when the remote stream ends.
fn merge_with_base(
    rows: BindingStream,
    base: BindingSet,
    mode: JoinMode,
    silent: bool,
) -> BindingStream {
    struct State {
        rows: Option<BindingStream>,
        base: BindingSet,
        mode: JoinMode,
        silent: bool,
        produced: bool,
    }
    let state = State {
        rows: Some(rows),
        base,
        mode,
        silent,
        produced: false,
    };
    Box::pin(stream::try_unfold(state, |mut st| async move {
        loop {
            let next = match st.rows.as_mut() {
                Some(rows) => rows.next().await,
                None => break,
            };
            match next {
                Some(Ok(row)) => {
                    st.produced = true;
                    let merged = row.merged_over(&st.base);
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
        if st.mode == JoinMode::Left && !st.produced {
            st.produced = true;
            let original = st.base.clone();
            return Ok(Some((original, st)));
        }
        Ok(None)
    }))
}
