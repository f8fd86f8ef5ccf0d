//! Keys that are already canonical skip the graph entirely.

use regex::Regex;
use std::sync::OnceLock;

/// Shape of a standard InChIKey (`XXXXXXXXXXXXXX-YYYYYYYYYY-Z`, the
/// protonation suffix optional).
pub const INCHIKEY_PATTERN: &str = "^[A-Z]{14}-[A-Z]{10}(-[A-Z])?$";

fn inchikey_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(INCHIKEY_PATTERN).expect("valid regex"))
}

/// Per-target-namespace patterns. A key matching the pattern of a target
/// namespace is taken to already be a value of that namespace.
#[derive(Debug, Clone, Default)]
pub struct ShortCircuit {
    rules: Vec<(String, Regex)>,
}

impl ShortCircuit {
    pub fn new() -> Self {
        Self::default()
    }

    /// InChIKey-shaped keys resolve to themselves in `inchikey`.
    pub fn inchikey() -> Self {
        let mut sc = Self::new();
        sc.add("inchikey", inchikey_regex().clone());
        sc
    }

    pub fn with_pattern(mut self, namespace: &str, pattern: &str) -> Result<Self, regex::Error> {
        self.add(namespace, Regex::new(pattern)?);
        Ok(self)
    }

    pub fn add(&mut self, namespace: &str, pattern: Regex) {
        self.rules.push((namespace.to_string(), pattern));
    }

    pub fn matches(&self, namespace: &str, key: &str) -> bool {
        self.rules
            .iter()
            .any(|(ns, re)| ns == namespace && re.is_match(key))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> + '_ {
        self.rules.iter().map(|(ns, _)| ns.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inchikey_shapes() {
        let sc = ShortCircuit::inchikey();
        assert!(sc.matches("inchikey", "BSYNRYMUTXBXSQ-UHFFFAOYSA-N"));
        assert!(sc.matches("inchikey", "BSYNRYMUTXBXSQ-UHFFFAOYSA"));
        assert!(!sc.matches("inchikey", "bsynrymutxbxsq-uhfffaoysa-n"));
        assert!(!sc.matches("inchikey", "InChI=1S/C9H8O4/c1-6(10)13-8-5-3-2-4-7(8)9(11)12/h2-5H,1H3,(H,11,12)"));
        assert!(!sc.matches("inchikey", "BSYNRYMUTXBXSQ-UHFFFAOYSA-N-extra"));
        // only the configured namespace is affected
        assert!(!sc.matches("drugbank", "BSYNRYMUTXBXSQ-UHFFFAOYSA-N"));
    }

    #[test]
    fn test_custom_pattern() {
        let sc = ShortCircuit::new().with_pattern("drugbank", r"^DB\d{5}$").unwrap();
        assert!(sc.matches("drugbank", "DB00945"));
        assert!(!sc.matches("drugbank", "DB0094"));
        assert!(ShortCircuit::new().with_pattern("drugbank", "(").is_err());
    }
}
