//! Shared fixtures for the integration tests
//!
//! `StubEndpoint` answers the requests the engine renders for a
//! single-pattern operand (`?s <pred> ?v`) against an in-memory list of
//! subject/object pairs, so tests exercise the real request/correlate
//! round trip. `ScriptedEndpoint` returns a fixed sequence of outcomes
//! regardless of the request, for protocol-violation and failure cases.

#![allow(dead_code)]

use async_trait::async_trait;
use fedra_exec::{
    BindingStream, ConnectionMode, EndpointAccess, FedError, FederationConfig, FederationContext,
    Operand, QueryOutcome, Result, TermOrVar, TriplePattern, ROW_INDEX_VAR,
};
use fedra_model::{BindingSet, RdfTerm};
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const EX: &str = "http://example.org/";

pub fn iri(local: &str) -> RdfTerm {
    RdfTerm::iri(format!("{EX}{local}"))
}

pub fn subject(n: usize) -> BindingSet {
    BindingSet::singleton("s", iri(&format!("s{n}")))
}

/// The operand used throughout: `?s <http://example.org/name> ?v`
pub fn name_operand() -> Operand {
    Operand::new(vec![TriplePattern::new(
        TermOrVar::var("s"),
        TermOrVar::term(iri("name")),
        TermOrVar::var("v"),
    )])
}

pub fn fctx() -> Arc<FederationContext> {
    FederationContext::new(FederationConfig::default().with_max_query_time(None))
}

pub fn fctx_with(config: FederationConfig) -> Arc<FederationContext> {
    FederationContext::new(config)
}

pub fn left_stream(bindings: Vec<BindingSet>) -> BindingStream {
    Box::pin(stream::iter(bindings.into_iter().map(Ok)))
}

fn remote_error(id: &str) -> FedError {
    FedError::RemoteError {
        endpoint: id.to_string(),
        reason: "evaluation failed".into(),
    }
}

fn unavailable(id: &str) -> FedError {
    FedError::RemoteUnavailable {
        endpoint: id.to_string(),
        reason: "connection refused".into(),
    }
}

#[derive(Clone, Copy)]
pub enum FailureKind {
    Remote,
    Unavailable,
}

/// In-memory endpoint over (subject, object) pairs under one predicate.
///
/// Understands the four request shapes the engine renders for a
/// single-pattern operand with variables `?s` and `?v`.
pub struct StubEndpoint {
    id: String,
    pairs: Vec<(String, String)>,
    reject_values: bool,
    failure: Option<FailureKind>,
    delay: Option<Duration>,
    queries: Mutex<Vec<String>>,
}

impl StubEndpoint {
    fn build(id: &str, pairs: Vec<(String, String)>) -> Self {
        Self {
            id: id.to_string(),
            pairs,
            reject_values: false,
            failure: None,
            delay: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn new(id: &str, pairs: Vec<(String, String)>) -> Arc<Self> {
        Arc::new(Self::build(id, pairs))
    }

    /// Pairs `(s{n}, v{n})` for `n` in `0..count`
    pub fn linear(id: &str, count: usize) -> Arc<Self> {
        let pairs = (0..count)
            .map(|n| (format!("{EX}s{n}"), format!("{EX}v{n}")))
            .collect();
        Self::new(id, pairs)
    }

    pub fn rejecting_values(id: &str, pairs: Vec<(String, String)>) -> Arc<Self> {
        let mut ep = Self::build(id, pairs);
        ep.reject_values = true;
        Arc::new(ep)
    }

    pub fn failing(id: &str, kind: FailureKind) -> Arc<Self> {
        let mut ep = Self::build(id, Vec::new());
        ep.failure = Some(kind);
        Arc::new(ep)
    }

    pub fn slow(id: &str, pairs: Vec<(String, String)>, delay: Duration) -> Arc<Self> {
        let mut ep = Self::build(id, pairs);
        ep.delay = Some(delay);
        Arc::new(ep)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn values_query_count(&self) -> usize {
        self.queries().iter().filter(|q| q.contains("VALUES")).count()
    }

    fn objects_for(&self, subject: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, o)| o.clone())
            .collect()
    }

    fn answer(&self, query: &str) -> Result<QueryOutcome> {
        if query.starts_with("ASK") {
            let iris = extract_iris(query);
            let found = iris.len() >= 3
                && self.pairs.iter().any(|(s, o)| *s == iris[0] && *o == iris[2]);
            return Ok(QueryOutcome::Boolean(found));
        }
        if let Some(tuples) = parse_values_tuples(query) {
            let mut rows = Vec::new();
            for (subject, index) in tuples {
                let index_term = RdfTerm::literal(index);
                match subject {
                    Some(s) => {
                        for object in self.objects_for(&s) {
                            rows.push(BindingSet::from_pairs([
                                ("s", RdfTerm::iri(s.clone())),
                                ("v", RdfTerm::iri(object)),
                                (ROW_INDEX_VAR, index_term.clone()),
                            ]));
                        }
                    }
                    // UNDEF: the pattern is unconstrained for this entry
                    None => {
                        for (s, o) in &self.pairs {
                            rows.push(BindingSet::from_pairs([
                                ("s", RdfTerm::iri(s.clone())),
                                ("v", RdfTerm::iri(o.clone())),
                                (ROW_INDEX_VAR, index_term.clone()),
                            ]));
                        }
                    }
                }
            }
            return Ok(QueryOutcome::Rows(rows_stream(rows)));
        }
        if query.contains("{ ?s ") {
            // Unbound request
            let rows = self
                .pairs
                .iter()
                .map(|(s, o)| {
                    BindingSet::from_pairs([
                        ("s", RdfTerm::iri(s.clone())),
                        ("v", RdfTerm::iri(o.clone())),
                    ])
                })
                .collect();
            return Ok(QueryOutcome::Rows(rows_stream(rows)));
        }
        // Bound request: first IRI in the pattern is the subject
        let iris = extract_iris(query);
        let rows = match iris.first() {
            Some(subject) => self
                .objects_for(subject)
                .into_iter()
                .map(|o| BindingSet::singleton("v", RdfTerm::iri(o)))
                .collect(),
            None => Vec::new(),
        };
        Ok(QueryOutcome::Rows(rows_stream(rows)))
    }
}

#[async_trait]
impl EndpointAccess for StubEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        query: &str,
        _base_uri: Option<&str>,
        _mode: ConnectionMode,
    ) -> Result<QueryOutcome> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure {
            Some(FailureKind::Remote) => return Err(remote_error(&self.id)),
            Some(FailureKind::Unavailable) => return Err(unavailable(&self.id)),
            None => {}
        }
        if self.reject_values && query.contains("VALUES") {
            return Err(FedError::MalformedRequest {
                endpoint: self.id.clone(),
                reason: "VALUES not supported".into(),
            });
        }
        self.answer(query)
    }
}

/// One scripted response per call
pub enum Script {
    Rows(Vec<BindingSet>),
    RowsThenError(Vec<BindingSet>, FedError),
    Boolean(bool),
    Fail(FedError),
}

/// Endpoint that ignores the request text and replays a fixed script
pub struct ScriptedEndpoint {
    id: String,
    script: Mutex<VecDeque<Script>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedEndpoint {
    pub fn new(id: &str, script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            script: Mutex::new(script.into()),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EndpointAccess for ScriptedEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        query: &str,
        _base_uri: Option<&str>,
        _mode: ConnectionMode,
    ) -> Result<QueryOutcome> {
        self.queries.lock().unwrap().push(query.to_string());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Rows(rows)) => Ok(QueryOutcome::Rows(rows_stream(rows))),
            Some(Script::RowsThenError(rows, err)) => {
                let items = rows
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(err)))
                    .collect::<Vec<_>>();
                Ok(QueryOutcome::Rows(Box::pin(stream::iter(items))))
            }
            Some(Script::Boolean(b)) => Ok(QueryOutcome::Boolean(b)),
            Some(Script::Fail(err)) => Err(err),
            None => Ok(QueryOutcome::Rows(rows_stream(Vec::new()))),
        }
    }
}

fn rows_stream(rows: Vec<BindingSet>) -> BindingStream {
    Box::pin(stream::iter(rows.into_iter().map(Ok)))
}

fn extract_iris(query: &str) -> Vec<String> {
    let mut iris = Vec::new();
    let mut rest = query;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        iris.push(rest[start + 1..start + len].to_string());
        rest = &rest[start + len + 1..];
    }
    iris
}

/// Parse the VALUES tuples out of a batched request; `None` if the query
/// has no VALUES clause. Each tuple is `(subject IRI or UNDEF, index)`.
fn parse_values_tuples(query: &str) -> Option<Vec<(Option<String>, String)>> {
    let after = &query[query.find("VALUES")? + "VALUES".len()..];
    let body_start = after.find('{')? + 1;
    let body_end = after.find('}')?;
    let body = &after[body_start..body_end];

    let mut tuples = Vec::new();
    for raw in body.split('(').skip(1) {
        let raw = raw.trim().trim_end_matches(')').trim();
        let subject = if raw.starts_with("UNDEF") {
            None
        } else {
            let end = raw.find('>')?;
            Some(raw[1..end].to_string())
        };
        let index = {
            let open = raw.rfind('"')?;
            let close = raw[..open].rfind('"')?;
            raw[close + 1..open].to_string()
        };
        tuples.push((subject, index));
    }
    Some(tuples)
}
