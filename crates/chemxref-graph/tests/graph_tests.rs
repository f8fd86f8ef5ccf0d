//! Graph construction, configuration loading and edge application tests

use chemxref_graph::*;
use chemxref_store::MemoryStore;
use proptest::prelude::*;
use serde_json::json;
use tempfile::tempdir;

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_load_config_file_roundtrips_through_builder() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.json");
    std::fs::write(&path, GraphConfig::mychem().to_json_pretty().unwrap()).unwrap();

    let cfg = GraphConfig::load(&path).unwrap();
    assert_eq!(cfg, GraphConfig::mychem());
    let graph = cfg.build().unwrap();
    assert!(graph.contains_namespace("chebi-short"));
}

#[test]
fn test_config_errors_are_fatal() {
    let mut cfg = GraphConfig::mychem();
    cfg.edges
        .push(EdgeConfig::lookup("rxnorm", "umls", "rxnorm", "rxnorm.code", "rxnorm.cui", None));
    match cfg.build() {
        Err(GraphError::UnknownNamespace { namespace, edge }) => {
            assert_eq!(namespace, "umls");
            assert_eq!(edge, "rxnorm->umls");
        }
        other => panic!("expected unknown namespace, got {other:?}"),
    }

    let mut cfg = GraphConfig::mychem();
    cfg.namespaces.push("inchi".to_string());
    assert!(matches!(cfg.build(), Err(GraphError::DuplicateNamespace(_))));

    let mut cfg = GraphConfig::mychem();
    cfg.edges[0].weight = Some(-1.0);
    assert!(matches!(cfg.build(), Err(GraphError::InvalidWeight { .. })));
}

#[test]
fn test_missing_config_file() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        GraphConfig::load(&dir.path().join("absent.json")),
        Err(GraphError::Io { .. })
    ));
}

// ============================================================================
// Edge application
// ============================================================================

#[tokio::test]
async fn test_store_lookup_fans_out() {
    let store = MemoryStore::new().with_collection(
        "drugbank",
        vec![json!({"drugbank": {
            "drugbank_id": "DB00945",
            "products": [
                {"ndc_product_code": "0363-0160"},
                {"ndc_product_code": "0363-0161"},
                {"ndc_product_code": "0904-2013"}
            ]
        }})],
    );

    let mut b = GraphBuilder::new();
    b.add_node("drugbank").unwrap();
    b.add_node("ndc").unwrap();
    let id = b
        .add_store_lookup(
            "drugbank",
            "ndc",
            StoreLookup::new("drugbank", "drugbank.drugbank_id", "drugbank.products.ndc_product_code"),
            0.1,
        )
        .unwrap();
    let graph = b.freeze();
    let edge = graph.edge(id).unwrap();

    let keys = edge.apply("DB00945", &store).await.unwrap();
    assert_eq!(keys.as_slice(), &["0363-0160", "0363-0161", "0904-2013"]);

    let none = edge.apply("DB99999", &store).await.unwrap();
    assert!(!none.is_found());
}

#[tokio::test]
async fn test_rewrite_never_queries_the_store() {
    let store = MemoryStore::new();
    let graph = GraphConfig::mychem().build().unwrap();
    let chebi = graph.namespace_id("chebi").unwrap();
    let edge = graph.neighbor_edges(chebi).next().unwrap();

    assert_eq!(edge.apply("CHEBI:15365", &store).await.unwrap().as_slice(), &["15365"]);
    assert_eq!(edge.rewrite("CHEBI:15365").unwrap().as_slice(), &["15365"]);
    assert_eq!(store.query_count(), 0);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_neighbors_are_weight_ordered_and_stable(
        weights in prop::collection::vec((0usize..4, 0u8..5), 0..40)
    ) {
        let mut b = GraphBuilder::new();
        let names = ["a", "b", "c", "d"];
        for n in names {
            b.add_node(n).unwrap();
        }
        let mut inserted = Vec::new();
        for (to, w) in &weights {
            let w = f64::from(*w) / 10.0;
            let id = b.add_pattern_rewrite("a", names[*to], "^x", "y", w).unwrap();
            inserted.push((id, w));
        }
        let graph = b.freeze();
        let a = graph.namespace_id("a").unwrap();
        let got: Vec<EdgeId> = graph.neighbors(a).to_vec();

        let mut expected = inserted.clone();
        expected.sort_by(|x, y| x.1.total_cmp(&y.1));
        let expected: Vec<EdgeId> = expected.into_iter().map(|(id, _)| id).collect();
        prop_assert_eq!(got, expected);
    }
}
