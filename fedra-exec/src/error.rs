//! Error types for federated query execution

use fedra_model::MergeConflict;
use thiserror::Error;

/// Federated execution errors
///
/// The taxonomy matters for control flow:
///
/// - [`MalformedRequest`](FedError::MalformedRequest) triggers the naive
///   per-binding fallback (an endpoint rejected a request we constructed)
/// - [`RemoteUnavailable`](FedError::RemoteUnavailable) /
///   [`RemoteError`](FedError::RemoteError) are suppressible when the
///   operand is marked silent
/// - [`QueryInterrupted`](FedError::QueryInterrupted) and
///   [`ProtocolViolation`](FedError::ProtocolViolation) are never
///   suppressed, silent or not
#[derive(Error, Debug)]
pub enum FedError {
    /// The endpoint's parser rejected a request this engine constructed.
    /// Not user-facing; triggers the per-binding fallback path.
    #[error("endpoint '{endpoint}' rejected constructed request: {reason}")]
    MalformedRequest { endpoint: String, reason: String },

    /// Connection to the endpoint could not be established
    #[error("endpoint '{endpoint}' unavailable: {reason}")]
    RemoteUnavailable { endpoint: String, reason: String },

    /// Evaluation failed at the endpoint
    #[error("remote evaluation failed at '{endpoint}': {reason}")]
    RemoteError { endpoint: String, reason: String },

    /// The query deadline elapsed while waiting (queue, latch, or remote
    /// call). Distinct from remote failures: this is a resource-budget
    /// violation and is always propagated.
    #[error("query evaluation interrupted: deadline exceeded while {0}")]
    QueryInterrupted(String),

    /// A returned row violated the bound-join wire protocol (e.g. a
    /// missing or unparsable row-index value). Indicates a construction
    /// bug; never suppressed.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Two stages assigned conflicting values to one variable
    #[error("binding conflict: {0}")]
    BindingConflict(#[from] MergeConflict),

    /// Operation on an executor that has been closed
    #[error("executor closed")]
    Closed,

    /// Invariant violation inside the engine
    #[error("internal error: {0}")]
    Internal(String),

    /// A primary failure with resource-close failures chained onto it.
    /// Close failures observed during cancellation are attached here
    /// rather than discarded or allowed to mask the original error.
    #[error("{primary}; {} close failure(s) chained", close_failures.len())]
    CloseChain {
        primary: Box<FedError>,
        close_failures: Vec<FedError>,
    },
}

impl FedError {
    /// Attach a failure observed while releasing resources to this error,
    /// keeping `self` as the primary cause.
    pub fn chain_close_failure(self, failure: FedError) -> FedError {
        match self {
            FedError::CloseChain {
                primary,
                mut close_failures,
            } => {
                close_failures.push(failure);
                FedError::CloseChain {
                    primary,
                    close_failures,
                }
            }
            primary => FedError::CloseChain {
                primary: Box::new(primary),
                close_failures: vec![failure],
            },
        }
    }

    /// The primary cause, unwrapping any chained close failures
    pub fn primary(&self) -> &FedError {
        match self {
            FedError::CloseChain { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// True if a silent operand may suppress this error and fall back to
    /// pass-through bindings.
    ///
    /// Only remote-side variance qualifies. Interrupts reflect the query's
    /// resource budget and protocol violations reflect construction bugs;
    /// neither may be silenced.
    pub fn is_silenceable(&self) -> bool {
        matches!(
            self.primary(),
            FedError::RemoteUnavailable { .. } | FedError::RemoteError { .. }
        )
    }

    /// True if this is (or chains) a deadline interrupt
    pub fn is_interrupted(&self) -> bool {
        matches!(self.primary(), FedError::QueryInterrupted(_))
    }
}

/// Result type for federated execution
pub type Result<T> = std::result::Result<T, FedError>;
