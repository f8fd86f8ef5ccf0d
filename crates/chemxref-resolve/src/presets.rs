//! Pipeline settings for the bundled drug/chemical sources.
//!
//! Each preset replaces the record `_id` with its InChIKey when one can be
//! found, and leaves InChIKey-shaped ids alone. All of them are meant to run
//! against [`chemxref_graph::GraphConfig::mychem`].

use crate::error::PipelineConfigError;
use crate::pipeline::{Cardinality, InputSpec, OutputSpec, PipelineConfig};
use crate::short_circuit::INCHIKEY_PATTERN;
use std::collections::BTreeMap;

pub const PRESET_NAMES: &[&str] = &["chebi", "sider", "pharmgkb", "ndc"];

fn canonical_id(inputs: Vec<InputSpec>, outputs: &[&str]) -> PipelineConfig {
    let mut short_circuit = BTreeMap::new();
    short_circuit.insert("inchikey".to_string(), INCHIKEY_PATTERN.to_string());
    PipelineConfig {
        inputs,
        outputs: outputs
            .iter()
            .map(|ns| OutputSpec::new(ns, None, Cardinality::Single))
            .collect(),
        id_field: Some("_id".to_string()),
        short_circuit,
        ..PipelineConfig::default()
    }
}

/// ChEBI entities: the CHEBI id, then DrugBank links. Falls back to a
/// DrugBank id when no InChIKey is reachable.
pub fn chebi() -> PipelineConfig {
    canonical_id(
        vec![
            InputSpec::id("chebi"),
            InputSpec::new("drugbank", "chebi.drugbank_database_links"),
        ],
        &["inchikey", "drugbank"],
    )
}

/// SIDER side effects, keyed by PubChem CID.
pub fn sider() -> PipelineConfig {
    canonical_id(vec![InputSpec::id("pubchem")], &["inchikey"])
}

/// PharmGKB drugs: the InChI first, then cross references. CHEBI cross
/// references carry the `CHEBI:` prefix.
pub fn pharmgkb() -> PipelineConfig {
    canonical_id(
        vec![
            InputSpec::new("inchi", "pharmgkb.inchi"),
            InputSpec::new("drugbank", "pharmgkb.cross_references.drugbank"),
            InputSpec::new("pubchem", "pharmgkb.cross_references.pubchem_compound"),
            InputSpec::new("chebi", "pharmgkb.cross_references.chebi"),
        ],
        &["inchikey"],
    )
}

/// NDC products, keyed by product code (one lookup through DrugBank).
pub fn ndc() -> PipelineConfig {
    canonical_id(vec![InputSpec::id("ndc")], &["inchikey"])
}

pub fn by_name(name: &str) -> Result<PipelineConfig, PipelineConfigError> {
    match name {
        "chebi" => Ok(chebi()),
        "sider" => Ok(sider()),
        "pharmgkb" => Ok(pharmgkb()),
        "ndc" => Ok(ndc()),
        other => Err(PipelineConfigError::UnknownPreset(other.to_string())),
    }
}
