//! Federated SPARQL query execution core
//!
//! This crate evaluates query fragments (join and union operands, SERVICE
//! calls) against remote endpoints, off the calling task, streaming partial
//! results back through bounded buffers into a single ordered sequence.
//!
//! The moving parts:
//!
//! - [`FederationContext`](context::FederationContext) owns the worker
//!   pools and configuration; [`QueryContext`](context::QueryContext)
//!   carries the per-query deadline and cancellation registry.
//! - [`ControlledWorkerScheduler`](scheduler::ControlledWorkerScheduler)
//!   bounds concurrent evaluation per purpose (join, union, left join).
//! - [`spawn_executor`](executor::spawn_executor) pairs a producer task
//!   with a [`ParallelExecutor`](executor::ParallelExecutor), the lazy
//!   consumer-side row stream backed by a bounded result queue.
//! - [`BoundJoinEvaluator`](bound_join::BoundJoinEvaluator) batches
//!   upstream bindings into VALUES-augmented requests and re-correlates
//!   returned rows by a synthetic row-index variable, falling back to
//!   per-binding evaluation when an endpoint rejects the batch.
//! - [`ServiceEvaluator`](service::ServiceEvaluator) and
//!   [`UnionEvaluator`](union::UnionEvaluator) cover SERVICE clauses and
//!   union nodes.
//!
//! Remote endpoints plug in through the
//! [`EndpointAccess`](endpoint::EndpointAccess) trait.

pub mod bound_join;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod operand;
pub mod query_render;
pub mod service;
pub mod union;

mod executor;
mod fallback;
mod queue;
mod scheduler;

pub use bound_join::{BoundJoinEvaluator, JoinMode};
pub use config::FederationConfig;
pub use context::{FederationContext, PoolPurpose, QueryContext};
pub use endpoint::{BindingStream, ConnectionMode, EndpointAccess, QueryOutcome};
pub use error::{FedError, Result};
pub use executor::{spawn_executor, ExecutorHandle, ParallelExecutor};
pub use operand::{Operand, TermOrVar, TriplePattern};
pub use query_render::ROW_INDEX_VAR;
pub use scheduler::ControlledWorkerScheduler;
pub use service::ServiceEvaluator;
pub use union::{UnionArm, UnionEvaluator};
