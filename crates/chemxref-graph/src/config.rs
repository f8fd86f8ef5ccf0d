//! Static graph configuration (JSON) and the built-in reference graph.
//!
//! ```json
//! {
//!   "namespaces": ["inchi", "drugbank", "inchikey"],
//!   "edges": [
//!     {"from": "inchi", "to": "drugbank", "kind": "store_lookup", "weight": 0.1,
//!      "collection": "drugbank", "source_field": "drugbank.inchi",
//!      "target_field": "drugbank.drugbank_id"},
//!     {"from": "chebi", "to": "chebi-short", "kind": "pattern_rewrite",
//!      "pattern": "^CHEBI:", "replacement": ""}
//!   ]
//! }
//! ```

use crate::edge::{EdgeKind, PatternRewrite, StoreLookup};
use crate::graph::{GraphBuilder, GraphError, ResolutionGraph};
use crate::{DEFAULT_LOOKUP_WEIGHT, DEFAULT_REWRITE_WEIGHT};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub from: String,
    pub to: String,
    /// Defaults to 1.0 for store lookups and 0.0 for rewrites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub kind: EdgeKindConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeKindConfig {
    StoreLookup {
        collection: String,
        source_field: String,
        target_field: String,
    },
    PatternRewrite {
        pattern: String,
        #[serde(default)]
        replacement: String,
    },
}

impl EdgeConfig {
    pub fn lookup(
        from: &str,
        to: &str,
        collection: &str,
        source_field: &str,
        target_field: &str,
        weight: Option<f64>,
    ) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            weight,
            label: None,
            kind: EdgeKindConfig::StoreLookup {
                collection: collection.to_string(),
                source_field: source_field.to_string(),
                target_field: target_field.to_string(),
            },
        }
    }

    pub fn rewrite(from: &str, to: &str, pattern: &str, replacement: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            weight: None,
            label: None,
            kind: EdgeKindConfig::PatternRewrite {
                pattern: pattern.to_string(),
                replacement: replacement.to_string(),
            },
        }
    }

    fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(match self.kind {
            EdgeKindConfig::StoreLookup { .. } => DEFAULT_LOOKUP_WEIGHT,
            EdgeKindConfig::PatternRewrite { .. } => DEFAULT_REWRITE_WEIGHT,
        })
    }
}

impl GraphConfig {
    pub fn from_json_str(text: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let text = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate and freeze. The first error aborts the build.
    pub fn build(&self) -> Result<ResolutionGraph, GraphError> {
        let mut builder = GraphBuilder::new();
        for ns in &self.namespaces {
            builder.add_node(ns)?;
        }
        for edge in &self.edges {
            let label = edge
                .label
                .clone()
                .unwrap_or_else(|| format!("{}->{}", edge.from, edge.to));
            let kind = match &edge.kind {
                EdgeKindConfig::StoreLookup {
                    collection,
                    source_field,
                    target_field,
                } => EdgeKind::StoreLookup(StoreLookup::new(collection, source_field, target_field)),
                EdgeKindConfig::PatternRewrite {
                    pattern,
                    replacement,
                } => EdgeKind::PatternRewrite(PatternRewrite::new(pattern, replacement).map_err(
                    |source| GraphError::InvalidPattern {
                        edge: label.clone(),
                        source,
                    },
                )?),
            };
            builder.add_edge(
                &edge.from,
                &edge.to,
                edge.effective_weight(),
                kind,
                Some(label.as_str()),
            )?;
        }
        Ok(builder.freeze())
    }

    /// The reference drug/chemical namespace graph.
    ///
    /// Weights favour authoritative direct joins (DrugBank) over ChEMBL and
    /// PubChem; the `chebi`/`chebi-short` pair is a zero-cost rewrite cycle
    /// between the prefixed and bare CHEBI id forms.
    pub fn mychem() -> Self {
        let namespaces = [
            "inchi",
            "chembl",
            "drugbank",
            "drugname",
            "pubchem",
            "rxnorm",
            "unii",
            "inchikey",
            "ndc",
            "chebi",
            "chebi-short",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let edges = vec![
            // pharmgkb
            EdgeConfig::lookup("inchi", "drugbank", "drugbank", "drugbank.inchi", "drugbank.drugbank_id", Some(0.1)),
            EdgeConfig::lookup("inchi", "chembl", "chembl", "chembl.inchi", "chembl.molecule_chembl_id", Some(0.2)),
            EdgeConfig::lookup("inchi", "pubchem", "pubchem", "pubchem.inchi", "pubchem.cid", Some(1.0)),
            EdgeConfig::lookup("chembl", "inchikey", "chembl", "chembl.molecule_chembl_id", "chembl.inchi_key", Some(0.2)),
            EdgeConfig::lookup("drugbank", "inchikey", "drugbank", "drugbank.drugbank_id", "drugbank.inchi_key", Some(0.1)),
            EdgeConfig::lookup("pubchem", "inchikey", "pubchem", "pubchem.cid", "pubchem.inchi_key", Some(0.1)),
            // ndc: one lookup through drugbank products
            EdgeConfig::lookup("ndc", "inchikey", "drugbank", "drugbank.products.ndc_product_code", "drugbank.inchi_key", Some(0.1)),
            // chebi
            EdgeConfig::rewrite("chebi", "chebi-short", "^CHEBI:", ""),
            EdgeConfig::rewrite("chebi-short", "chebi", "^", "CHEBI:"),
            EdgeConfig::lookup("chebi-short", "drugbank", "drugbank", "drugbank.chebi", "drugbank.drugbank_id", None),
            EdgeConfig::lookup("chebi-short", "chembl", "chembl", "chembl.chebi_par_id", "chembl.molecule_chembl_id", None),
        ];

        Self { namespaces, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mychem_builds() {
        let g = GraphConfig::mychem().build().unwrap();
        assert_eq!(g.namespace_count(), 11);
        assert_eq!(g.edge_count(), 11);

        let chebi = g.namespace_id("chebi").unwrap();
        let out: Vec<&str> = g.neighbor_edges(chebi).map(|e| e.label()).collect();
        assert_eq!(out, vec!["chebi->chebi-short"]);
    }

    #[test]
    fn test_default_weights() {
        let g = GraphConfig::mychem().build().unwrap();
        let short = g.namespace_id("chebi-short").unwrap();
        let weights: Vec<f64> = g.neighbor_edges(short).map(|e| e.weight()).collect();
        // rewrite back to chebi (0.0) sorts before the two lookups (1.0)
        assert_eq!(weights, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_json_shape() {
        let text = r#"{
            "namespaces": ["chebi", "chebi-short", "drugbank"],
            "edges": [
                {"from": "chebi", "to": "chebi-short", "kind": "pattern_rewrite", "pattern": "^CHEBI:"},
                {"from": "chebi-short", "to": "drugbank", "kind": "store_lookup", "weight": 0.5,
                 "collection": "drugbank", "source_field": "drugbank.chebi",
                 "target_field": "drugbank.drugbank_id", "label": "chebi via drugbank"}
            ]
        }"#;
        let cfg = GraphConfig::from_json_str(text).unwrap();
        assert_eq!(
            cfg.edges[0].kind,
            EdgeKindConfig::PatternRewrite {
                pattern: "^CHEBI:".to_string(),
                replacement: String::new()
            }
        );
        let g = cfg.build().unwrap();
        let short = g.namespace_id("chebi-short").unwrap();
        let edge = g.neighbor_edges(short).next().unwrap();
        assert_eq!(edge.label(), "chebi via drugbank");
        assert_eq!(edge.weight(), 0.5);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let text = r#"{"namespaces": ["a", "b"], "edges": [{"from": "a", "to": "b", "kind": "http"}]}"#;
        assert!(matches!(
            GraphConfig::from_json_str(text),
            Err(GraphError::Parse(_))
        ));
    }
}
