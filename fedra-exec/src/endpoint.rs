//! Endpoint access contract
//!
//! The execution core never talks to the network itself: it renders a
//! request string and hands it to an [`EndpointAccess`] implementation,
//! which returns a lazy row stream (SELECT) or a boolean (ASK). HTTP
//! transport, connection pooling and result parsing live behind this trait.

use crate::error::Result;
use async_trait::async_trait;
use fedra_model::BindingSet;
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;

/// A lazy sequence of result rows
///
/// Items are `Result` so remote failures surface mid-stream; dropping the
/// stream releases whatever connection or cursor backs it.
pub type BindingStream = Pin<Box<dyn Stream<Item = Result<BindingSet>> + Send>>;

/// Build a stream over already-materialized rows
pub fn stream_from_rows(rows: Vec<BindingSet>) -> BindingStream {
    Box::pin(stream::iter(rows).map(Ok))
}

/// The empty row stream
pub fn empty_stream() -> BindingStream {
    Box::pin(stream::empty())
}

/// How a connection is obtained for one remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Open a dedicated connection for this call and release it afterwards
    Fresh,
    /// Reuse a pooled connection
    Reused,
}

/// Outcome of a remote request
pub enum QueryOutcome {
    /// SELECT result: a lazy row stream
    Rows(BindingStream),
    /// ASK result
    Boolean(bool),
}

/// A remote (or local) SPARQL endpoint
///
/// Implementations raise [`FedError::MalformedRequest`] when the remote
/// parser rejects the request text, [`FedError::RemoteUnavailable`] for
/// connection failures, and [`FedError::RemoteError`] for evaluation
/// failures.
///
/// [`FedError::MalformedRequest`]: crate::error::FedError::MalformedRequest
/// [`FedError::RemoteUnavailable`]: crate::error::FedError::RemoteUnavailable
/// [`FedError::RemoteError`]: crate::error::FedError::RemoteError
#[async_trait]
pub trait EndpointAccess: Send + Sync {
    /// Stable identifier for logs and error messages (typically the
    /// endpoint URL or repository name)
    fn id(&self) -> &str;

    /// Execute a rendered SPARQL request
    async fn execute(
        &self,
        query: &str,
        base_uri: Option<&str>,
        mode: ConnectionMode,
    ) -> Result<QueryOutcome>;
}
