//! Shared fixtures for the resolver integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chemxref_graph::{GraphBuilder, ResolutionGraph, StoreLookup};
use chemxref_store::{DocumentStore, MemoryStore, StoreError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ASPIRIN_INCHI: &str =
    "InChI=1S/C9H8O4/c1-6(10)13-8-5-3-2-4-7(8)9(11)12/h2-5H,1H3,(H,11,12)";
pub const ASPIRIN_INCHIKEY: &str = "BSYNRYMUTXBXSQ-UHFFFAOYSA-N";
/// Value the ChEMBL snapshot carries for the same molecule.
pub const ASPIRIN_CHEMBL_INCHIKEY: &str = "BSYNRYMUTXBXSQ-UHFFFAOYSA-M";

/// inchi -> drugbank (0.1) -> inchikey (0.1), inchi -> chembl (0.2) -> inchikey (0.2)
pub fn aspirin_graph() -> Arc<ResolutionGraph> {
    let mut b = GraphBuilder::new();
    for ns in ["inchi", "drugbank", "chembl", "pubchem", "inchikey"] {
        b.add_node(ns).unwrap();
    }
    b.add_store_lookup(
        "inchi",
        "drugbank",
        StoreLookup::new("drugbank", "drugbank.inchi", "drugbank.drugbank_id"),
        0.1,
    )
    .unwrap();
    b.add_store_lookup(
        "drugbank",
        "inchikey",
        StoreLookup::new("drugbank", "drugbank.drugbank_id", "drugbank.inchi_key"),
        0.1,
    )
    .unwrap();
    b.add_store_lookup(
        "inchi",
        "chembl",
        StoreLookup::new("chembl", "chembl.inchi", "chembl.molecule_chembl_id"),
        0.2,
    )
    .unwrap();
    b.add_store_lookup(
        "chembl",
        "inchikey",
        StoreLookup::new("chembl", "chembl.molecule_chembl_id", "chembl.inchi_key"),
        0.2,
    )
    .unwrap();
    Arc::new(b.freeze())
}

pub fn aspirin_store() -> MemoryStore {
    MemoryStore::new()
        .with_collection(
            "drugbank",
            vec![json!({"drugbank": {
                "drugbank_id": "DB00945",
                "inchi": ASPIRIN_INCHI,
                "inchi_key": ASPIRIN_INCHIKEY,
                "chebi": "15365",
                "products": [
                    {"ndc_product_code": "0363-0160"},
                    {"ndc_product_code": "0904-2013"}
                ]
            }})],
        )
        .with_collection(
            "chembl",
            vec![json!({"chembl": {
                "molecule_chembl_id": "CHEMBL25",
                "inchi": ASPIRIN_INCHI,
                "inchi_key": ASPIRIN_CHEMBL_INCHIKEY,
                "chebi_par_id": 15365
            }})],
        )
        .with_collection(
            "pubchem",
            vec![json!({"pubchem": {
                "cid": 2244,
                "inchi": ASPIRIN_INCHI,
                "inchi_key": ASPIRIN_INCHIKEY
            }})],
        )
}

pub fn inchi_record(id: &str, inchi: &str) -> Value {
    json!({"_id": id, "source": {"inchi": inchi}})
}

/// Fails the first `failures` calls, then delegates.
pub struct FlakyStore {
    pub inner: MemoryStore,
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_down() -> Self {
        Self::new(MemoryStore::new(), usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn find(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Value>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.find(collection, field, value).await
    }
}

/// Delays every query; the delay for a value may be overridden.
pub struct SlowStore {
    pub inner: MemoryStore,
    pub delay: Duration,
    pub slow_values: Vec<(String, Duration)>,
    pub calls: AtomicUsize,
}

impl SlowStore {
    pub fn new(inner: MemoryStore, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            slow_values: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for SlowStore {
    async fn find(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Value>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .slow_values
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, d)| *d)
            .unwrap_or(self.delay);
        tokio::time::sleep(delay).await;
        self.inner.find(collection, field, value).await
    }
}

/// Every query against `collection` fails; other collections answer normally.
pub struct CollectionDownStore {
    pub inner: MemoryStore,
    pub collection: String,
}

impl CollectionDownStore {
    pub fn new(inner: MemoryStore, collection: &str) -> Self {
        Self {
            inner,
            collection: collection.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for CollectionDownStore {
    async fn find(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Value>, StoreError> {
        if collection == self.collection {
            return Err(StoreError::Unavailable(format!("{collection} down")));
        }
        self.inner.find(collection, field, value).await
    }
}
