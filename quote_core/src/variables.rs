//! # Variable Environment
//!
//! Formulas see two kinds of variables:
//!
//! - **Globals** - the fixed set `H, L, P, H1, L1, P1, ..., H4, L4, P4`,
//!   supplied by the caller once per recalculation.
//! - **Module-local** - `HM, LM, PM`, taken from the nearest preceding
//!   header row and valid until the next header.
//!
//! Values are kept as the numeric strings the user typed (`"560,5"` is fine);
//! the formula evaluator normalises them on substitution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{QuoteError, QuoteResult};

/// Names accepted as global variables.
pub const GLOBAL_NAMES: [&str; 15] = [
    "H", "L", "P", "H1", "L1", "P1", "H2", "L2", "P2", "H3", "L3", "P3", "H4", "L4", "P4",
];

/// Module-local height, width and depth, in that order.
pub const MODULE_NAMES: [&str; 3] = ["HM", "LM", "PM"];

/// Name → numeric string mapping used for formula substitution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableMap(BTreeMap<String, String>);

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from `(name, value)` pairs. Names are upper-cased.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = VariableMap::new();
        for (name, value) in pairs {
            map.set(name, value);
        }
        map
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into().to_ascii_uppercase(), value.into());
    }

    /// Value for `name`. Blank values count as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check that every name belongs to the global variable set.
    pub fn validate_globals(&self) -> QuoteResult<()> {
        for name in self.0.keys() {
            if !GLOBAL_NAMES.contains(&name.as_str()) {
                return Err(QuoteError::invalid_input(
                    "globals",
                    name.clone(),
                    format!("'{}' is not a global variable (expected one of H, L, P, H1..P4)", name),
                ));
            }
        }
        Ok(())
    }
}

/// Supplies the global variables for one recalculation.
pub trait GlobalSource {
    fn globals(&self) -> VariableMap;
}

impl GlobalSource for VariableMap {
    fn globals(&self) -> VariableMap {
        self.clone()
    }
}

/// Module-local variables derived from a header's resolved dimensions.
///
/// A dimension that did not resolve is left out of the map rather than set
/// to zero, so a child formula that uses it fails loudly.
pub fn module_variables(comp: Option<f64>, larg: Option<f64>, esp: Option<f64>) -> VariableMap {
    let mut vars = VariableMap::new();
    for (name, value) in MODULE_NAMES.iter().zip([comp, larg, esp]) {
        if let Some(v) = value {
            vars.set(*name, v.to_string());
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_uppercased() {
        let vars = VariableMap::from_pairs([("h", "2000")]);
        assert_eq!(vars.get("H"), Some("2000"));
        assert_eq!(vars.get("h"), None);
    }

    #[test]
    fn test_validate_globals() {
        let ok = VariableMap::from_pairs([("H", "1"), ("P4", "2")]);
        assert!(ok.validate_globals().is_ok());

        let bad = VariableMap::from_pairs([("HM", "1")]);
        let err = bad.validate_globals().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_module_variables_skip_unresolved() {
        let vars = module_variables(Some(720.0), None, Some(560.0));
        assert_eq!(vars.get("HM"), Some("720"));
        assert_eq!(vars.get("LM"), None);
        assert_eq!(vars.get("PM"), Some("560"));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let vars = VariableMap::from_pairs([("H", "2000")]);
        let json = serde_json::to_string(&vars).unwrap();
        assert_eq!(json, r#"{"H":"2000"}"#);
    }
}
