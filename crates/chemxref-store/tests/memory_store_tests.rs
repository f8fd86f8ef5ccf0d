//! MemoryStore loading and query tests

use chemxref_store::{DocumentStore, MemoryStore, StoreError};
use std::fs;
use tempfile::tempdir;

#[tokio::test]
async fn test_load_dir_names_collections_after_files() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("drugbank.jsonl"),
        concat!(
            "{\"drugbank\": {\"drugbank_id\": \"DB00945\", \"inchi\": \"InChI=1S/C9H8O4/c1-6(10)13-8-5-3-2-4-7(8)9(11)12/h2-5H,1H3,(H,11,12)\"}}\n",
            "{\"drugbank\": {\"drugbank_id\": \"DB00316\", \"products\": [{\"ndc_product_code\": \"0363-0160\"}]}}\n",
        ),
    )
    .unwrap();
    fs::write(
        dir.path().join("pubchem.json"),
        "[{\"pubchem\": {\"cid\": 2244, \"inchi_key\": \"BSYNRYMUTXBXSQ-UHFFFAOYSA-N\"}}]",
    )
    .unwrap();
    fs::write(dir.path().join("README.txt"), "ignored").unwrap();

    let store = MemoryStore::load_dir(dir.path()).unwrap();
    assert_eq!(store.collection_names(), vec!["drugbank", "pubchem"]);
    assert_eq!(store.collection_len("drugbank"), 2);

    // Numeric fields are matched by their printed form.
    let hits = store.find("pubchem", "pubchem.cid", "2244").await.unwrap();
    assert_eq!(hits.len(), 1);

    // Array-valued paths match any element.
    let hits = store
        .find("drugbank", "drugbank.products.ndc_product_code", "0363-0160")
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["drugbank"]["drugbank_id"], "DB00316");
}

#[tokio::test]
async fn test_find_returns_every_matching_document() {
    let store = MemoryStore::new().with_collection(
        "drugbank",
        vec![
            serde_json::json!({"drugbank": {"chebi": "15365", "drugbank_id": "DB00945"}}),
            serde_json::json!({"drugbank": {"chebi": "15365", "drugbank_id": "DB01234"}}),
            serde_json::json!({"drugbank": {"chebi": "15365", "drugbank_id": "DB05678"}}),
            serde_json::json!({"drugbank": {"chebi": "99999", "drugbank_id": "DB00001"}}),
        ],
    );
    let hits = store
        .find("drugbank", "drugbank.chebi", "15365")
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
}

#[test]
fn test_load_dir_reports_bad_lines() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("chembl.jsonl"), "{\"ok\": 1}\n{broken\n").unwrap();

    match MemoryStore::load_dir(dir.path()) {
        Err(StoreError::Parse { line, path, .. }) => {
            assert_eq!(line, 2);
            assert!(path.ends_with("chembl.jsonl"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected a parse error"),
    }
}

#[test]
fn test_load_dir_missing_directory() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(matches!(
        MemoryStore::load_dir(&missing),
        Err(StoreError::Io { .. })
    ));
}
