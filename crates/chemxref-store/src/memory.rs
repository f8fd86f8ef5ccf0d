//! In-memory document store with lazily built field indexes.

use crate::jsonl::read_documents;
use crate::path::key_strings_at;
use crate::{DocumentStore, StoreError};
use ahash::AHashMap;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Field index: key -> positions of matching documents in the collection.
type FieldIndex = AHashMap<String, Vec<u32>>;

/// Collections of JSON documents answering `find` from memory.
///
/// Indexes are built per `(collection, field)` the first time that pair is
/// queried and reused afterwards. Inserting into a collection drops its
/// indexes.
#[derive(Default)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<Value>>,
    indexes: DashMap<(String, String), Arc<FieldIndex>>,
    queries: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with_collection(mut self, name: &str, docs: Vec<Value>) -> Self {
        self.insert_many(name, docs);
        self
    }

    pub fn insert(&mut self, collection: &str, doc: Value) {
        self.insert_many(collection, std::iter::once(doc));
    }

    pub fn insert_many(&mut self, collection: &str, docs: impl IntoIterator<Item = Value>) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
        self.indexes.retain(|(c, _), _| c != collection);
    }

    /// Load every `*.jsonl` / `*.json` file in `dir` as a collection named
    /// after the file stem (`drugbank.jsonl` -> `drugbank`).
    pub fn load_dir(dir: &Path) -> Result<Self, StoreError> {
        let mut store = Self::new();
        let entries = std::fs::read_dir(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let is_doc_file = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("jsonl") | Some("json")
            );
            if path.is_file() && is_doc_file {
                files.push(path);
            }
        }
        files.sort();

        for path in files {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let docs = read_documents(&path)?;
            tracing::debug!(collection = name, docs = docs.len(), "loaded collection");
            store.insert_many(name, docs);
        }
        Ok(store)
    }

    pub fn collection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, Vec::len)
    }

    /// Number of `find` calls served so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    fn index_for(&self, collection: &str, docs: &[Value], field: &str) -> Arc<FieldIndex> {
        let key = (collection.to_string(), field.to_string());
        if let Some(index) = self.indexes.get(&key) {
            return Arc::clone(&index);
        }
        let entry = self.indexes.entry(key).or_insert_with(|| {
            let mut index = FieldIndex::new();
            for (pos, doc) in docs.iter().enumerate() {
                for k in key_strings_at(doc, field) {
                    index.entry(k).or_default().push(pos as u32);
                }
            }
            tracing::debug!(collection, field, keys = index.len(), "built field index");
            Arc::new(index)
        });
        Arc::clone(&entry)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let Some(docs) = self.collections.get(collection) else {
            tracing::trace!(collection, "find on a collection that is not loaded");
            return Ok(Vec::new());
        };

        let index = self.index_for(collection, docs, field);
        let Some(positions) = index.get(value.trim()) else {
            return Ok(Vec::new());
        };

        Ok(positions
            .iter()
            .filter_map(|&pos| docs.get(pos as usize))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drugbank() -> MemoryStore {
        MemoryStore::new().with_collection(
            "drugbank",
            vec![
                json!({"drugbank": {"drugbank_id": "DB00945", "inchi_key": "BSYNRYMUTXBXSQ-UHFFFAOYSA-N"}}),
                json!({"drugbank": {"drugbank_id": "DB00316", "inchi_key": "RZVAJINKPMORJF-UHFFFAOYSA-N"}}),
            ],
        )
    }

    #[tokio::test]
    async fn test_find_by_field() {
        let store = drugbank();
        let hits = store
            .find("drugbank", "drugbank.drugbank_id", "DB00945")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["drugbank"]["inchi_key"], "BSYNRYMUTXBXSQ-UHFFFAOYSA-N");
    }

    #[tokio::test]
    async fn test_missing_collection_and_key_are_empty() {
        let store = drugbank();
        assert!(store.find("chembl", "chembl.inchi", "x").await.unwrap().is_empty());
        assert!(store
            .find("drugbank", "drugbank.drugbank_id", "DB99999")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn test_insert_invalidates_index() {
        let mut store = drugbank();
        assert!(store
            .find("drugbank", "drugbank.drugbank_id", "DB00001")
            .await
            .unwrap()
            .is_empty());
        store.insert("drugbank", json!({"drugbank": {"drugbank_id": "DB00001"}}));
        assert_eq!(
            store
                .find("drugbank", "drugbank.drugbank_id", "DB00001")
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
