//! chemxref-graph: the identifier namespace graph
//!
//! Nodes are identifier namespaces (`inchi`, `drugbank`, `chebi`, ...), edges
//! are ways of translating a key from one namespace into another:
//!
//! ```text
//!            store_lookup(drugbank: drugbank.inchi -> drugbank.drugbank_id, 0.1)
//!   inchi ─────────────────────────────────────────────────────────────────► drugbank
//!     │                                                                         │
//!     │ store_lookup(chembl, 0.2)                     store_lookup(drugbank, 0.1)
//!     ▼                                                                         ▼
//!   chembl ────────────────────── store_lookup(chembl, 0.2) ──────────────► inchikey
//!
//!   chebi ◄──── pattern_rewrite(^ -> CHEBI:) ────┐
//!     └────── pattern_rewrite(^CHEBI: -> "") ──► chebi-short
//! ```
//!
//! ## Lifecycle
//!
//! A graph is described by a [`GraphConfig`] (JSON, or the built-in
//! [`GraphConfig::mychem`]), assembled through a [`GraphBuilder`] which
//! validates every node and edge, then frozen into an immutable
//! [`ResolutionGraph`]. Frozen graphs have no mutation API and are shared
//! between workers behind an `Arc`.

pub mod config;
pub mod edge;
pub mod graph;

use serde::{Deserialize, Serialize};

pub use config::{EdgeConfig, EdgeKindConfig, GraphConfig};
pub use edge::{Edge, EdgeId, EdgeKind, KeySet, PatternRewrite, StoreLookup};
pub use graph::{GraphBuilder, GraphError, ResolutionGraph};

/// Weight used for store lookups whose configuration leaves it out.
pub const DEFAULT_LOOKUP_WEIGHT: f64 = 1.0;

/// Weight used for pattern rewrites whose configuration leaves it out.
pub const DEFAULT_REWRITE_WEIGHT: f64 = 0.0;

/// Compact namespace id (dense index into the graph's namespace table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NamespaceId(u32);

impl NamespaceId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}
