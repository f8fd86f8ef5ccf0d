//! Edges: the unit of identifier translation.

use crate::NamespaceId;
use chemxref_store::{key_strings_at, DocumentStore, StoreError};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Dense edge id, assigned in insertion order. Also the cache identity of a
/// store lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EdgeId(u32);

impl EdgeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Ordered, duplicate-free keys produced by one edge application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySet(Vec<String>);

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: impl Into<String>) -> Self {
        let mut set = Self::new();
        set.push(key);
        set
    }

    /// Append `key` unless it is blank or already present.
    pub fn push(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !key.trim().is_empty() && !self.0.contains(&key) {
            self.0.push(key);
        }
    }

    pub fn is_found(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl FromIterator<String> for KeySet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        for key in iter {
            set.push(key);
        }
        set
    }
}

impl IntoIterator for KeySet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// "Find documents in `collection` whose `source_field` equals the key and
/// return their `target_field` values."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLookup {
    pub collection: String,
    pub source_field: String,
    pub target_field: String,
}

impl StoreLookup {
    pub fn new(collection: &str, source_field: &str, target_field: &str) -> Self {
        Self {
            collection: collection.to_string(),
            source_field: source_field.to_string(),
            target_field: target_field.to_string(),
        }
    }

    /// Every `target_field` value across all matching documents. No match is
    /// an empty set, not an error.
    pub async fn lookup(&self, key: &str, store: &dyn DocumentStore) -> Result<KeySet, StoreError> {
        let docs = store
            .find(&self.collection, &self.source_field, key)
            .await?;
        let mut out = KeySet::new();
        for doc in &docs {
            for value in key_strings_at(doc, &self.target_field) {
                out.push(value);
            }
        }
        Ok(out)
    }
}

/// Pure string rewrite: the first match of `pattern` is replaced with
/// `replacement` (`$1`-style group references allowed).
#[derive(Debug, Clone)]
pub struct PatternRewrite {
    pattern: Regex,
    replacement: String,
}

impl PatternRewrite {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Keys the pattern does not match pass through unchanged.
    pub fn apply(&self, key: &str) -> String {
        self.pattern
            .replace(key, self.replacement.as_str())
            .into_owned()
    }
}

impl PartialEq for PatternRewrite {
    fn eq(&self, other: &Self) -> bool {
        self.pattern.as_str() == other.pattern.as_str() && self.replacement == other.replacement
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    StoreLookup(StoreLookup),
    PatternRewrite(PatternRewrite),
}

impl EdgeKind {
    pub fn name(&self) -> &'static str {
        match self {
            EdgeKind::StoreLookup(_) => "store_lookup",
            EdgeKind::PatternRewrite(_) => "pattern_rewrite",
        }
    }
}

/// A directed, weighted edge between two namespaces of a built graph.
#[derive(Debug, Clone)]
pub struct Edge {
    pub(crate) id: EdgeId,
    pub(crate) from: NamespaceId,
    pub(crate) to: NamespaceId,
    pub(crate) weight: f64,
    pub(crate) kind: EdgeKind,
    pub(crate) label: String,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn from_ns(&self) -> NamespaceId {
        self.from
    }

    pub fn to_ns(&self) -> NamespaceId {
        self.to
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn kind(&self) -> &EdgeKind {
        &self.kind
    }

    /// Configured label, or `from->to`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_store_lookup(&self) -> bool {
        matches!(self.kind, EdgeKind::StoreLookup(_))
    }

    /// Synchronous application for rewrite edges; `None` for store lookups.
    pub fn rewrite(&self, key: &str) -> Option<KeySet> {
        match &self.kind {
            EdgeKind::PatternRewrite(rw) => Some(KeySet::single(rw.apply(key))),
            EdgeKind::StoreLookup(_) => None,
        }
    }

    /// Translate `key` across this edge. Rewrites never touch `store`.
    pub async fn apply(&self, key: &str, store: &dyn DocumentStore) -> Result<KeySet, StoreError> {
        match &self.kind {
            EdgeKind::PatternRewrite(rw) => Ok(KeySet::single(rw.apply(key))),
            EdgeKind::StoreLookup(lookup) => lookup.lookup(key, store).await,
        }
    }
}
