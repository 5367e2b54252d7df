//! # Reference Data Collaborators
//!
//! The engine prices rows from two read-only collaborators it does not own:
//!
//! - [`Catalog`] - material, edge and finish prices keyed by reference code
//! - [`AssociationRules`] - which components a piece type drags along with it
//!
//! Both are traits so callers can plug in whatever backs their price tables.
//! [`MemoryCatalog`] and [`AssociationTable`] are the in-memory, JSON-loadable
//! implementations used by the CLI and the tests.
//!
//! ## Example
//!
//! ```rust
//! use quote_core::catalog::{Catalog, CatalogEntry, MemoryCatalog};
//!
//! let mut catalog = MemoryCatalog::new();
//! catalog.insert("AGL18", CatalogEntry::new(18.0, 12.5, 0.15));
//!
//! let entry = catalog.lookup("AGL18").unwrap();
//! assert_eq!(entry.net_price, 12.5);
//! assert!(catalog.lookup("MISSING").is_none());
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::row::{Unit, MAX_ASSOCIATED};

/// Reference data for one material, edge or finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Nominal thickness in millimetres
    pub thickness_mm: f64,
    /// Net price per unit of measure (m² for boards and edges)
    pub net_price: f64,
    /// Waste fraction (0.10 = 10 %); zero means "not specified"
    #[serde(default)]
    pub waste_fraction: f64,
    /// Material family (e.g. "MDF", "AGL")
    #[serde(default)]
    pub family: Option<String>,
}

impl CatalogEntry {
    pub fn new(thickness_mm: f64, net_price: f64, waste_fraction: f64) -> Self {
        CatalogEntry {
            thickness_mm,
            net_price,
            waste_fraction,
            family: None,
        }
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }
}

/// Catalog lookup by reference code.
pub trait Catalog {
    fn lookup(&self, reference: &str) -> Option<CatalogEntry>;
}

/// In-memory catalog keyed by reference code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, entry: CatalogEntry) -> Option<CatalogEntry> {
        self.entries.insert(reference.into(), entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Catalog for MemoryCatalog {
    fn lookup(&self, reference: &str) -> Option<CatalogEntry> {
        self.entries.get(reference).cloned()
    }
}

/// Memoises lookups for the duration of one recalculation pass.
///
/// Misses are cached too, so a missing reference is asked for once.
pub struct CachedCatalog<'a> {
    inner: &'a dyn Catalog,
    cache: RefCell<HashMap<String, Option<CatalogEntry>>>,
}

impl<'a> CachedCatalog<'a> {
    pub fn new(inner: &'a dyn Catalog) -> Self {
        CachedCatalog {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Number of distinct references looked up so far.
    pub fn cached_references(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl Catalog for CachedCatalog<'_> {
    fn lookup(&self, reference: &str) -> Option<CatalogEntry> {
        if let Some(hit) = self.cache.borrow().get(reference) {
            return hit.clone();
        }
        let entry = self.inner.lookup(reference);
        debug!(reference, found = entry.is_some(), "catalog lookup");
        self.cache
            .borrow_mut()
            .insert(reference.to_string(), entry.clone());
        entry
    }
}

/// One associated component required by a piece type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationEntry {
    pub associated_code: String,
    /// Name of the quantity rule in the [`crate::calculations::associations::QuantityRuleRegistry`]
    pub quantity_rule: String,
    #[serde(default)]
    pub unit: Unit,
    #[serde(default)]
    pub description: String,
    /// Material the inserted row is priced from
    #[serde(default)]
    pub material_ref: Option<String>,
}

impl AssociationEntry {
    pub fn new(associated_code: impl Into<String>, quantity_rule: impl Into<String>) -> Self {
        AssociationEntry {
            associated_code: associated_code.into(),
            quantity_rule: quantity_rule.into(),
            unit: Unit::Und,
            description: String::new(),
            material_ref: None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_material(mut self, reference: impl Into<String>) -> Self {
        self.material_ref = Some(reference.into());
        self
    }
}

/// Association rule lookup: principal definition code → up to three entries.
pub trait AssociationRules {
    fn rules_for(&self, definition_code: &str) -> Vec<AssociationEntry>;
}

/// In-memory association rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssociationTable {
    rules: HashMap<String, Vec<AssociationEntry>>,
}

impl AssociationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an associated component for `definition_code`.
    ///
    /// Entries past [`MAX_ASSOCIATED`] are ignored.
    pub fn add(&mut self, definition_code: impl Into<String>, entry: AssociationEntry) -> &mut Self {
        let entries = self.rules.entry(definition_code.into()).or_default();
        if entries.len() < MAX_ASSOCIATED {
            entries.push(entry);
        }
        self
    }
}

impl AssociationRules for AssociationTable {
    fn rules_for(&self, definition_code: &str) -> Vec<AssociationEntry> {
        self.rules
            .get(definition_code)
            .map(|entries| entries.iter().take(MAX_ASSOCIATED).cloned().collect())
            .unwrap_or_default()
    }
}
