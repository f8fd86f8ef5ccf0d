//! Error types for resolution and batch runs.

use chemxref_store::StoreError;
use std::path::PathBuf;

/// Errors from a single path search.
///
/// Not finding anything is never an error: unreachable targets come back as
/// empty sets. A failing lookup is only returned as [`SearchError::Store`]
/// when no target resolved; otherwise it is listed in
/// [`Resolution::failures`](crate::Resolution::failures).
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("unknown namespace `{0}`")]
    UnknownNamespace(String),

    #[error("lookup {edge} ({from} -> {to}) failed for key `{key}`: {source}")]
    Store {
        edge: String,
        from: String,
        to: String,
        key: String,
        #[source]
        source: StoreError,
    },
}

impl SearchError {
    /// Label of the failing edge, if any.
    pub fn edge(&self) -> Option<&str> {
        match self {
            SearchError::Store { edge, .. } => Some(edge),
            SearchError::UnknownNamespace(_) => None,
        }
    }
}

/// Run-level failures. Each one ends the outcome stream after it is yielded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunError {
    #[error("record {record}: upstream source error: {message}")]
    Source { record: u64, message: String },

    #[error(
        "store unavailable: {failures} consecutive records failed \
         (last: record {record}, namespace {namespace}, edge {edge})"
    )]
    StoreUnavailable {
        record: u64,
        edge: String,
        namespace: String,
        failures: usize,
    },
}

/// Invalid pipeline configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum PipelineConfigError {
    #[error("pipeline declares no inputs")]
    NoInputs,

    #[error("pipeline declares no outputs")]
    NoOutputs,

    #[error("{role} references unknown namespace `{namespace}`")]
    UnknownNamespace { role: &'static str, namespace: String },

    #[error("{what} must not be empty")]
    EmptyField { what: String },

    #[error("workers must be at least 1")]
    ZeroWorkers,

    #[error("short-circuit pattern for `{namespace}`: {source}")]
    InvalidPattern {
        namespace: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown preset `{0}` (expected one of: chebi, sider, pharmgkb, ndc)")]
    UnknownPreset(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
