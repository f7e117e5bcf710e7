//! Federation configuration
//!
//! Knobs are programmatic (builder-style `with_*` setters); there is no
//! config-file surface at this layer.

use std::time::Duration;

/// Configuration for a federation instance
///
/// Worker counts are per pool purpose: separate pools for join, union and
/// left-join evaluation avoid cross-starvation between node kinds.
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// Number of upstream bindings packed into one bound-join block.
    /// `0` disables batching limits: the entire input becomes one block.
    pub bound_join_block_size: usize,
    /// Worker count for the join scheduler
    pub join_worker_threads: usize,
    /// Worker count for the union scheduler
    pub union_worker_threads: usize,
    /// Worker count for the left-join scheduler
    pub left_join_worker_threads: usize,
    /// Overall per-query deadline; `None` disables enforcement
    pub max_query_time: Option<Duration>,
    /// Acquire a fresh endpoint connection per remote call instead of
    /// reusing a pooled one
    pub fresh_connection_per_call: bool,
    /// Evaluate SERVICE nodes through the bound-join batcher rather than
    /// the naive per-binding path
    pub enable_service_as_bound_join: bool,
    /// Capacity of each executor's result hand-off queue
    pub result_queue_capacity: usize,
    /// Bounded wait for in-flight tasks during graceful pool shutdown
    pub shutdown_grace: Duration,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            bound_join_block_size: 15,
            join_worker_threads: 20,
            union_worker_threads: 20,
            left_join_worker_threads: 10,
            max_query_time: Some(Duration::from_secs(30)),
            fresh_connection_per_call: true,
            enable_service_as_bound_join: true,
            result_queue_capacity: 1024,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl FederationConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bound-join block size (`0` = one block for the whole input)
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.bound_join_block_size = size;
        self
    }

    /// Set the join pool worker count
    pub fn with_join_workers(mut self, n: usize) -> Self {
        self.join_worker_threads = n;
        self
    }

    /// Set the union pool worker count
    pub fn with_union_workers(mut self, n: usize) -> Self {
        self.union_worker_threads = n;
        self
    }

    /// Set the left-join pool worker count
    pub fn with_left_join_workers(mut self, n: usize) -> Self {
        self.left_join_worker_threads = n;
        self
    }

    /// Set (or clear) the per-query deadline
    pub fn with_max_query_time(mut self, limit: Option<Duration>) -> Self {
        self.max_query_time = limit;
        self
    }

    /// Choose between fresh and reused endpoint connections
    pub fn with_fresh_connections(mut self, fresh: bool) -> Self {
        self.fresh_connection_per_call = fresh;
        self
    }

    /// Enable or disable bound-join batching for SERVICE evaluation
    pub fn with_service_as_bound_join(mut self, enabled: bool) -> Self {
        self.enable_service_as_bound_join = enabled;
        self
    }

    /// Set the per-executor result queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.result_queue_capacity = capacity.max(1);
        self
    }
}
