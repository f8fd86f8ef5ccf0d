//! Best-first resolution over `(namespace, key)` states.
//!
//! ```text
//!   frontier (min-heap on cost, then discovery order)
//!   ┌──────────────────────────────┐
//!   │ (inchi, "InChI=1S/...", 0.0) │──pop──► settle ──► target? record value
//!   └──────────────────────────────┘                │
//!                ▲                                  ▼
//!                └──── push (to, key', cost + w) ◄── apply each outgoing edge
//! ```
//!
//! A state is settled at most once, which is what makes cyclic graphs
//! (`chebi` <-> `chebi-short`) terminate. Rewrite edges run inline; store
//! lookups go through the per-run [`LookupCache`] and the [`RetryPolicy`].

use crate::cache::LookupCache;
use crate::error::SearchError;
use crate::retry::RetryPolicy;
use crate::short_circuit::ShortCircuit;
use ahash::AHashSet;
use chemxref_graph::{Edge, EdgeId, KeySet, NamespaceId, ResolutionGraph};
use chemxref_store::DocumentStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use tracing::{debug, warn};

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Collect every value reachable within the limits.
    #[default]
    Exhaustive,
    /// Stop once every requested target has at least one value.
    FirstResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalLimits {
    pub max_hops: usize,
    pub max_cost: f64,
    /// Settled states per search.
    pub max_expansions: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_hops: 8,
            max_cost: 16.0,
            max_expansions: 10_000,
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// One traversed edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub edge: EdgeId,
    pub from: String,
    pub to: String,
    /// Key the edge was applied to.
    pub input: String,
}

impl Hop {
    pub fn label(&self) -> String {
        format!("{}->{}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub key: String,
    pub cost: f64,
    pub path: Vec<Hop>,
}

/// Values resolved for one target namespace, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedSet(Vec<ResolvedValue>);

impl ResolvedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: ResolvedValue) {
        self.0.push(value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[ResolvedValue] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedValue> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(|v| v.key.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|v| v.key == key)
    }

    /// Lowest cost; the earliest discovered wins ties.
    pub fn best(&self) -> Option<&ResolvedValue> {
        self.0.iter().fold(None, |best: Option<&ResolvedValue>, v| match best {
            Some(b) if b.cost <= v.cost => Some(b),
            _ => Some(v),
        })
    }
}

impl IntoIterator for ResolvedSet {
    type Item = ResolvedValue;
    type IntoIter = std::vec::IntoIter<ResolvedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A store lookup that still failed after retries. The search skipped that
/// edge for that key and kept expanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFailure {
    pub edge: String,
    pub from: String,
    pub to: String,
    /// Key the edge was applied to.
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// One entry per requested target namespace.
    pub targets: BTreeMap<String, ResolvedSet>,
    /// A traversal limit cut the search short.
    pub truncated: bool,
    /// States settled.
    pub expansions: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EdgeFailure>,
}

impl Resolution {
    pub fn get(&self, namespace: &str) -> Option<&ResolvedSet> {
        self.targets.get(namespace)
    }

    pub fn is_resolved(&self, namespace: &str) -> bool {
        self.get(namespace).is_some_and(|set| !set.is_empty())
    }

    pub fn any_resolved(&self) -> bool {
        self.targets.values().any(|set| !set.is_empty())
    }
}

// ============================================================================
// Frontier
// ============================================================================

struct Frontier {
    cost: f64,
    seq: u64,
    namespace: NamespaceId,
    key: String,
    path: Vec<Hop>,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse so the cheapest, oldest state pops first.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// Search
// ============================================================================

/// One search context: borrowed graph, store and run-scoped cache.
pub struct PathSearch<'a> {
    graph: &'a ResolutionGraph,
    store: &'a dyn DocumentStore,
    cache: &'a LookupCache,
    short_circuit: &'a ShortCircuit,
    limits: TraversalLimits,
    retry: RetryPolicy,
}

impl<'a> PathSearch<'a> {
    pub fn new(
        graph: &'a ResolutionGraph,
        store: &'a dyn DocumentStore,
        cache: &'a LookupCache,
        short_circuit: &'a ShortCircuit,
    ) -> Self {
        Self {
            graph,
            store,
            cache,
            short_circuit,
            limits: TraversalLimits::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_limits(mut self, limits: TraversalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve `source_key` (in `source_namespace`) into each of `targets`.
    pub async fn resolve(
        &self,
        source_namespace: &str,
        source_key: &str,
        targets: &[&str],
        mode: SearchMode,
    ) -> Result<Resolution, SearchError> {
        let source = self.namespace(source_namespace)?;
        let mut pending: Vec<(NamespaceId, &str)> = Vec::with_capacity(targets.len());
        let mut resolution = Resolution::default();
        for &target in targets {
            let id = self.namespace(target)?;
            if resolution.targets.contains_key(target) {
                continue;
            }
            resolution.targets.insert(target.to_string(), ResolvedSet::new());
            pending.push((id, target));
        }

        let key = source_key.trim();
        if key.is_empty() {
            return Ok(resolution);
        }

        pending.retain(|&(_, target)| {
            if !self.short_circuit.matches(target, key) {
                return true;
            }
            if let Some(set) = resolution.targets.get_mut(target) {
                set.push(ResolvedValue {
                    key: key.to_string(),
                    cost: 0.0,
                    path: Vec::new(),
                });
            }
            false
        });
        if pending.is_empty() {
            debug!(source = source_namespace, key, "all targets short-circuited");
            return Ok(resolution);
        }

        let mut settled: AHashSet<(NamespaceId, String)> = AHashSet::new();
        let mut first_error: Option<SearchError> = None;
        let mut heap = BinaryHeap::new();
        let mut seq = 0u64;
        heap.push(Frontier {
            cost: 0.0,
            seq,
            namespace: source,
            key: key.to_string(),
            path: Vec::new(),
        });

        while let Some(state) = heap.pop() {
            if settled.contains(&(state.namespace, state.key.clone())) {
                continue;
            }
            if resolution.expansions >= self.limits.max_expansions {
                resolution.truncated = true;
                break;
            }
            settled.insert((state.namespace, state.key.clone()));
            resolution.expansions += 1;

            if let Some(&(_, target)) = pending.iter().find(|(ns, _)| *ns == state.namespace) {
                if let Some(set) = resolution.targets.get_mut(target) {
                    set.push(ResolvedValue {
                        key: state.key.clone(),
                        cost: state.cost,
                        path: state.path.clone(),
                    });
                }
                if mode == SearchMode::FirstResolution
                    && pending
                        .iter()
                        .all(|(_, t)| resolution.is_resolved(t))
                {
                    break;
                }
            }

            for edge in self.graph.neighbor_edges(state.namespace) {
                let cost = state.cost + edge.weight();
                if state.path.len() >= self.limits.max_hops || cost > self.limits.max_cost {
                    resolution.truncated = true;
                    continue;
                }

                let keys = match self.apply_edge(edge, &state.key).await {
                    Ok(keys) => keys,
                    Err(err) => {
                        warn!(error = %err, "lookup failed; skipping edge");
                        if let SearchError::Store {
                            edge, from, to, key, ..
                        } = &err
                        {
                            resolution.failures.push(EdgeFailure {
                                edge: edge.clone(),
                                from: from.clone(),
                                to: to.clone(),
                                key: key.clone(),
                                message: err.to_string(),
                            });
                        }
                        first_error.get_or_insert(err);
                        continue;
                    }
                };
                for next in keys {
                    if settled.contains(&(edge.to_ns(), next.clone())) {
                        continue;
                    }
                    let mut path = state.path.clone();
                    path.push(Hop {
                        edge: edge.id(),
                        from: self.name(edge.from_ns()),
                        to: self.name(edge.to_ns()),
                        input: state.key.clone(),
                    });
                    seq += 1;
                    heap.push(Frontier {
                        cost,
                        seq,
                        namespace: edge.to_ns(),
                        key: next,
                        path,
                    });
                }
            }
        }

        if resolution.truncated {
            warn!(
                source = source_namespace,
                key,
                expansions = resolution.expansions,
                "traversal limit reached; unreached targets count as not found"
            );
        }
        // Failed lookups only fail the search when nothing else got through.
        if let (false, Some(err)) = (resolution.any_resolved(), first_error) {
            return Err(err);
        }
        Ok(resolution)
    }

    async fn apply_edge(&self, edge: &Edge, key: &str) -> Result<KeySet, SearchError> {
        if let Some(keys) = edge.rewrite(key) {
            return Ok(keys);
        }
        self.cache
            .get_or_compute(edge.id(), key, || async {
                debug!(edge = edge.label(), key, "store lookup");
                self.retry
                    .run(edge.label(), || edge.apply(key, self.store))
                    .await
            })
            .await
            .map_err(|source| SearchError::Store {
                edge: edge.label().to_string(),
                from: self.name(edge.from_ns()),
                to: self.name(edge.to_ns()),
                key: key.to_string(),
                source,
            })
    }

    fn namespace(&self, name: &str) -> Result<NamespaceId, SearchError> {
        self.graph
            .namespace_id(name)
            .ok_or_else(|| SearchError::UnknownNamespace(name.to_string()))
    }

    fn name(&self, id: NamespaceId) -> String {
        self.graph.namespace_name(id).unwrap_or_default().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chemxref_graph::GraphBuilder;
    use chemxref_store::MemoryStore;
    use serde_json::json;

    fn chebi_cycle() -> ResolutionGraph {
        let mut b = GraphBuilder::new();
        b.add_node("chebi").unwrap();
        b.add_node("chebi-short").unwrap();
        b.add_node("drugbank").unwrap();
        b.add_pattern_rewrite("chebi", "chebi-short", "^CHEBI:", "", 0.0).unwrap();
        b.add_pattern_rewrite("chebi-short", "chebi", "^", "CHEBI:", 0.0).unwrap();
        b.add_store_lookup(
            "chebi-short",
            "drugbank",
            chemxref_graph::StoreLookup::new("drugbank", "drugbank.chebi", "drugbank.drugbank_id"),
            1.0,
        )
        .unwrap();
        b.freeze()
    }

    #[tokio::test]
    async fn test_cycle_terminates_without_matches() {
        let graph = chebi_cycle();
        let store = MemoryStore::new();
        let cache = LookupCache::new();
        let sc = ShortCircuit::new();
        let search = PathSearch::new(&graph, &store, &cache, &sc);

        let res = search
            .resolve("chebi", "CHEBI:15365", &["drugbank"], SearchMode::Exhaustive)
            .await
            .unwrap();
        assert!(!res.is_resolved("drugbank"));
        assert!(!res.truncated);
        // chebi:CHEBI:15365, chebi-short:15365 and nothing else
        assert_eq!(res.expansions, 2);
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn test_source_namespace_as_target() {
        let graph = chebi_cycle();
        let store = MemoryStore::new().with_collection(
            "drugbank",
            vec![json!({"drugbank": {"chebi": "15365", "drugbank_id": "DB00945"}})],
        );
        let cache = LookupCache::new();
        let sc = ShortCircuit::new();
        let search = PathSearch::new(&graph, &store, &cache, &sc);

        let res = search
            .resolve("chebi", "CHEBI:15365", &["chebi", "drugbank"], SearchMode::Exhaustive)
            .await
            .unwrap();
        let chebi = res.get("chebi").unwrap();
        assert_eq!(chebi.len(), 1);
        assert!(chebi.values()[0].path.is_empty());

        let db = res.get("drugbank").unwrap().best().unwrap();
        assert_eq!(db.key, "DB00945");
        let labels: Vec<String> = db.path.iter().map(Hop::label).collect();
        assert_eq!(labels, vec!["chebi->chebi-short", "chebi-short->drugbank"]);
        assert_eq!(db.path[1].input, "15365");
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_an_error() {
        let graph = chebi_cycle();
        let store = MemoryStore::new();
        let cache = LookupCache::new();
        let sc = ShortCircuit::new();
        let search = PathSearch::new(&graph, &store, &cache, &sc);

        let err = search
            .resolve("umls", "C0004057", &["drugbank"], SearchMode::Exhaustive)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::UnknownNamespace(ns) if ns == "umls"));

        let err = search
            .resolve("chebi", "CHEBI:1", &["umls"], SearchMode::Exhaustive)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::UnknownNamespace(ns) if ns == "umls"));
    }

    #[tokio::test]
    async fn test_hop_limit_truncates() {
        let graph = chebi_cycle();
        let store = MemoryStore::new().with_collection(
            "drugbank",
            vec![json!({"drugbank": {"chebi": "15365", "drugbank_id": "DB00945"}})],
        );
        let cache = LookupCache::new();
        let sc = ShortCircuit::new();
        let search = PathSearch::new(&graph, &store, &cache, &sc).with_limits(TraversalLimits {
            max_hops: 1,
            ..TraversalLimits::default()
        });

        let res = search
            .resolve("chebi", "CHEBI:15365", &["drugbank"], SearchMode::Exhaustive)
            .await
            .unwrap();
        assert!(res.truncated);
        assert!(!res.is_resolved("drugbank"));
        assert_eq!(store.query_count(), 0);
    }

    #[test]
    fn test_best_prefers_first_on_ties() {
        let mut set = ResolvedSet::new();
        for (key, cost) in [("a", 0.4), ("b", 0.2), ("c", 0.2)] {
            set.push(ResolvedValue {
                key: key.to_string(),
                cost,
                path: Vec::new(),
            });
        }
        assert_eq!(set.best().unwrap().key, "b");
        assert!(ResolvedSet::new().best().is_none());
    }
}
