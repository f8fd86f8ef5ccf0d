//! chemxref-store: read-only document access for identifier resolution
//!
//! The resolution engine never talks to a database directly. It only needs one
//! read contract:
//!
//! ```text
//! find(collection, field, value) -> [document, ...]
//! ```
//!
//! "Return every document in `collection` whose (dotted) `field` equals
//! `value`". Fields may cross arrays (`drugbank.products.ndc_product_code`),
//! in which case a document matches when *any* element matches.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: collections held in memory, with per-(collection, field)
//!   hash indexes built on first use. Loadable from a directory of
//!   `<collection>.jsonl` files, which is how reference snapshots are shipped
//!   to the CLI and tests.
//!
//! Anything else (a document database, an HTTP service) implements
//! [`DocumentStore`] in its own crate.

pub mod jsonl;
pub mod memory;
pub mod path;

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub use jsonl::{read_documents, JsonLinesReader};
pub use memory::MemoryStore;
pub use path::{key_strings_at, scalar_key, set_path, values_at, FieldPathError};

/// Errors raised by store backends.
///
/// "No document matched" is *not* an error: `find` returns an empty vector.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path} at line {line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query on {collection}.{field} failed: {message}")]
    Query {
        collection: String,
        field: String,
        message: String,
    },
}

/// Read contract used by store-lookup edges.
///
/// Implementations must be idempotent and safe to call concurrently; the
/// resolver retries failed calls.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents in `collection` whose `field` (dotted path) equals `value`.
    async fn find(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn find(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        (**self).find(collection, field, value).await
    }
}
