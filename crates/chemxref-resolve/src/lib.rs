//! chemxref-resolve: identifier resolution over the namespace graph
//!
//! ```text
//!  raw records ──► BatchResolver ──► per record, per (input, key):
//!                      │
//!                      │   ShortCircuit ── key already canonical? done
//!                      │        │
//!                      │        ▼
//!                      │   PathSearch (best-first over (namespace, key))
//!                      │        │  rewrite edges inline
//!                      │        │  store lookups ──► LookupCache ──► RetryPolicy ──► DocumentStore
//!                      │        ▼
//!                      └── merge per target ──► write fields ──► RecordOutcome stream
//! ```
//!
//! ## Concurrency
//!
//! The graph is immutable and shared by `Arc`. Records are resolved by a
//! bounded pool of futures (`buffered` / `buffer_unordered`). The only
//! suspension points are store lookups, and the lookup cache guarantees at
//! most one in-flight query per `(edge, key)` within a run.
//!
//! ## Entry points
//!
//! - [`Resolver::resolve`]: one key, fresh cache.
//! - [`BatchResolver::run`]: a stream of records, one cache per run.

pub mod cache;
pub mod error;
pub mod pipeline;
pub mod presets;
pub mod retry;
pub mod search;
pub mod short_circuit;

use chemxref_graph::ResolutionGraph;
use chemxref_store::DocumentStore;
use std::sync::Arc;

pub use cache::{CacheStats, LookupCache};
pub use error::{PipelineConfigError, RunError, SearchError};
pub use pipeline::{
    BatchResolver, Cardinality, InputSpec, LookupFailure, MergeMode, OutputSpec, PipelineConfig,
    RecordOutcome, RecordStatus, ResolutionRun, RunStats, UnresolvedPolicy,
};
pub use retry::RetryPolicy;
pub use search::{
    EdgeFailure, Hop, PathSearch, Resolution, ResolvedSet, ResolvedValue, SearchMode, TraversalLimits,
};
pub use short_circuit::{ShortCircuit, INCHIKEY_PATTERN};

/// Graph, store and search settings, created once and shared.
#[derive(Clone)]
pub struct Resolver {
    graph: Arc<ResolutionGraph>,
    store: Arc<dyn DocumentStore>,
    short_circuit: ShortCircuit,
    limits: TraversalLimits,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("namespaces", &self.graph.namespace_count())
            .field("edges", &self.graph.edge_count())
            .field("short_circuit", &self.short_circuit)
            .field("limits", &self.limits)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Resolver {
    pub fn new(graph: Arc<ResolutionGraph>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            graph,
            store,
            short_circuit: ShortCircuit::new(),
            limits: TraversalLimits::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_short_circuit(mut self, short_circuit: ShortCircuit) -> Self {
        self.short_circuit = short_circuit;
        self
    }

    pub fn with_limits(mut self, limits: TraversalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn graph(&self) -> &Arc<ResolutionGraph> {
        &self.graph
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn short_circuit(&self) -> &ShortCircuit {
        &self.short_circuit
    }

    /// Search context bound to `cache`.
    pub fn search<'a>(&'a self, cache: &'a LookupCache) -> PathSearch<'a> {
        PathSearch::new(&self.graph, self.store.as_ref(), cache, &self.short_circuit)
            .with_limits(self.limits)
            .with_retry(self.retry)
    }

    /// Resolve one key with a throwaway cache.
    pub async fn resolve(
        &self,
        source_namespace: &str,
        key: &str,
        targets: &[&str],
        mode: SearchMode,
    ) -> Result<Resolution, SearchError> {
        let cache = LookupCache::new();
        self.search(&cache)
            .resolve(source_namespace, key, targets, mode)
            .await
    }
}
