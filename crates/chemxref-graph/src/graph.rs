//! Graph construction and the frozen, read-only resolution graph.

use crate::edge::{Edge, EdgeId, EdgeKind, PatternRewrite, StoreLookup};
use crate::NamespaceId;
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration errors. All of them are fatal at startup: no partially
/// built graph is ever handed out.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("namespace name must not be empty")]
    EmptyNamespace,

    #[error("namespace `{0}` declared twice")]
    DuplicateNamespace(String),

    #[error("edge {edge} references undeclared namespace `{namespace}`")]
    UnknownNamespace { edge: String, namespace: String },

    #[error("edge {edge} has invalid weight {weight} (must be finite and >= 0)")]
    InvalidWeight { edge: String, weight: f64 },

    #[error("edge {edge}: invalid pattern: {source}")]
    InvalidPattern {
        edge: String,
        #[source]
        source: regex::Error,
    },

    #[error("edge {edge}: {reason}")]
    InvalidEdge { edge: String, reason: String },

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid graph configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Mutable graph under construction.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    names: Vec<String>,
    by_name: HashMap<String, NamespaceId>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) -> Result<NamespaceId, GraphError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GraphError::EmptyNamespace);
        }
        if self.by_name.contains_key(name) {
            return Err(GraphError::DuplicateNamespace(name.to_string()));
        }
        let id = NamespaceId::new(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add an edge between two declared namespaces.
    ///
    /// `label` defaults to `from->to`.
    pub fn add_edge(
        &mut self,
        from: &str,
        to: &str,
        weight: f64,
        kind: EdgeKind,
        label: Option<&str>,
    ) -> Result<EdgeId, GraphError> {
        let label = match label {
            Some(l) if !l.trim().is_empty() => l.trim().to_string(),
            _ => format!("{from}->{to}"),
        };

        let from_id = self.resolve_endpoint(&label, from)?;
        let to_id = self.resolve_endpoint(&label, to)?;

        if !weight.is_finite() || weight < 0.0 {
            return Err(GraphError::InvalidWeight {
                edge: label,
                weight,
            });
        }

        if let EdgeKind::StoreLookup(lookup) = &kind {
            for (what, value) in [
                ("collection", &lookup.collection),
                ("source_field", &lookup.source_field),
                ("target_field", &lookup.target_field),
            ] {
                if value.trim().is_empty() {
                    return Err(GraphError::InvalidEdge {
                        edge: label,
                        reason: format!("store lookup {what} must not be empty"),
                    });
                }
            }
        }

        let id = EdgeId::new(self.edges.len() as u32);
        self.edges.push(Edge {
            id,
            from: from_id,
            to: to_id,
            weight,
            kind,
            label,
        });
        Ok(id)
    }

    pub fn add_store_lookup(
        &mut self,
        from: &str,
        to: &str,
        lookup: StoreLookup,
        weight: f64,
    ) -> Result<EdgeId, GraphError> {
        self.add_edge(from, to, weight, EdgeKind::StoreLookup(lookup), None)
    }

    pub fn add_pattern_rewrite(
        &mut self,
        from: &str,
        to: &str,
        pattern: &str,
        replacement: &str,
        weight: f64,
    ) -> Result<EdgeId, GraphError> {
        let rewrite =
            PatternRewrite::new(pattern, replacement).map_err(|source| GraphError::InvalidPattern {
                edge: format!("{from}->{to}"),
                source,
            })?;
        self.add_edge(from, to, weight, EdgeKind::PatternRewrite(rewrite), None)
    }

    fn resolve_endpoint(&self, edge: &str, name: &str) -> Result<NamespaceId, GraphError> {
        self.by_name
            .get(name.trim())
            .copied()
            .ok_or_else(|| GraphError::UnknownNamespace {
                edge: edge.to_string(),
                namespace: name.to_string(),
            })
    }

    /// Freeze into a read-only graph. Adjacency lists are ordered by
    /// ascending weight; equal weights keep insertion order.
    pub fn freeze(self) -> ResolutionGraph {
        let mut adjacency: Vec<Vec<EdgeId>> = vec![Vec::new(); self.names.len()];
        for edge in &self.edges {
            adjacency[edge.from.index()].push(edge.id);
        }
        for list in &mut adjacency {
            // stable: ties stay in insertion order
            list.sort_by(|a, b| {
                let wa = self.edges[a.raw() as usize].weight;
                let wb = self.edges[b.raw() as usize].weight;
                wa.total_cmp(&wb)
            });
        }

        ResolutionGraph {
            names: self.names,
            by_name: self.by_name,
            edges: self.edges,
            adjacency,
        }
    }
}

/// Immutable namespace graph. `Send + Sync`; share it with `Arc`.
#[derive(Debug)]
pub struct ResolutionGraph {
    names: Vec<String>,
    by_name: HashMap<String, NamespaceId>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<EdgeId>>,
}

impl ResolutionGraph {
    pub fn namespace_id(&self, name: &str) -> Option<NamespaceId> {
        self.by_name.get(name).copied()
    }

    pub fn namespace_name(&self, id: NamespaceId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    pub fn contains_namespace(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Namespace names in declaration order.
    pub fn namespaces(&self) -> impl Iterator<Item = (NamespaceId, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (NamespaceId::new(i as u32), n.as_str()))
    }

    pub fn namespace_count(&self) -> usize {
        self.names.len()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.raw() as usize)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Outgoing edge ids, cheapest first.
    pub fn neighbors(&self, ns: NamespaceId) -> &[EdgeId] {
        self.adjacency
            .get(ns.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn neighbor_edges(&self, ns: NamespaceId) -> impl Iterator<Item = &Edge> + '_ {
        self.neighbors(ns).iter().filter_map(|id| self.edge(*id))
    }

    /// Namespaces reachable from `from` (including itself), ignoring data.
    pub fn reachable_from(&self, from: NamespaceId) -> Vec<NamespaceId> {
        let mut seen = vec![false; self.names.len()];
        let mut stack = vec![from];
        let mut out = Vec::new();
        while let Some(ns) = stack.pop() {
            match seen.get_mut(ns.index()) {
                Some(flag) if !*flag => *flag = true,
                _ => continue,
            }
            out.push(ns);
            for edge in self.neighbor_edges(ns) {
                stack.push(edge.to);
            }
        }
        out.sort();
        out
    }
}
