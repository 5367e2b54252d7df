//! # Recalculation Engine
//!
//! Single entry point that drives the row rules to a fixpoint:
//!
//! ```text
//! ┌──────────────────────── pass (≤ max_iterations) ────────────────────────┐
//! │ resolve (tracker + dimensions) → edges → expand → insert? → costs       │
//! │                                              │                          │
//! │                                   rows added: re-resolve + edges        │
//! └─────────────────────── repeat while rows were added ────────────────────┘
//! ```
//!
//! Catalog lookups are memoised per pass. A pass that inserts rows re-runs
//! resolution before costing, so new associated rows are costed with their
//! rule-derived quantities in the same pass.
//!
//! ## Example
//!
//! ```rust
//! use quote_core::catalog::{AssociationEntry, AssociationTable, CatalogEntry, MemoryCatalog};
//! use quote_core::engine::{RecalcEngine, RecalcStatus};
//! use quote_core::row::{Row, Unit};
//! use quote_core::variables::VariableMap;
//!
//! let mut catalog = MemoryCatalog::new();
//! catalog.insert("AGL18", CatalogEntry::new(18.0, 12.0, 0.1));
//! let mut rules = AssociationTable::new();
//! rules.add("SHELF", AssociationEntry::new("PIN", "fixed_one"));
//!
//! let mut rows = vec![
//!     Row::principal("SHELF", Unit::M2).with_dimensions("L", "P", "").with_material("AGL18"),
//! ];
//! let globals = VariableMap::from_pairs([("L", "800"), ("P", "500")]);
//!
//! let engine = RecalcEngine::new(&catalog, &rules);
//! let report = engine.recalculate(&mut rows, &globals);
//!
//! assert_eq!(report.status, RecalcStatus::Converged);
//! assert_eq!(rows.len(), 2);
//! assert_eq!(rows[1].definition_code, "PIN");
//! ```

use std::cell::Cell;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calculations::associations::{apply_insertions, apply_quantity_rule, collect_insertions};
use crate::calculations::costs::{compute_costs, refresh_catalog_fields};
use crate::calculations::dimensions::resolve_row;
use crate::calculations::edges::compute_edges;
use crate::calculations::{ModuleTracker, QuantityRuleRegistry, RecalcWarning};
use crate::catalog::{AssociationRules, CachedCatalog, Catalog};
use crate::config::EngineConfig;
use crate::errors::QuoteError;
use crate::row::{renumber, Row};
use crate::variables::{GlobalSource, VariableMap};

/// Re-entrancy guard owned by an engine.
#[derive(Debug, Default)]
pub struct RecomputeGuard {
    busy: Cell<bool>,
}

impl RecomputeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Mark the engine busy. `None` when a recalculation already holds it.
    pub fn try_acquire(&self) -> Option<GuardToken<'_>> {
        if self.busy.replace(true) {
            return None;
        }
        Some(GuardToken { busy: &self.busy })
    }
}

/// Releases the guard when dropped, on every exit path.
#[derive(Debug)]
pub struct GuardToken<'a> {
    busy: &'a Cell<bool>,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}

/// How a recalculation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecalcStatus {
    /// A pass inserted no rows
    Converged,
    /// Stopped at `max_iterations`; results of the last pass are kept
    IterationCapReached,
    /// Another recalculation was in progress; nothing was touched
    AlreadyRunning,
}

/// Outcome of one [`RecalcEngine::recalculate`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalcReport {
    pub status: RecalcStatus,
    /// Passes run
    pub iterations: u32,
    /// Associated rows inserted across all passes
    pub rows_inserted: usize,
    /// Warnings of the final pass
    pub warnings: Vec<RecalcWarning>,
}

impl RecalcReport {
    fn already_running() -> Self {
        RecalcReport {
            status: RecalcStatus::AlreadyRunning,
            iterations: 0,
            rows_inserted: 0,
            warnings: Vec::new(),
        }
    }

    pub fn is_converged(&self) -> bool {
        self.status == RecalcStatus::Converged
    }
}

/// The recalculation orchestrator.
pub struct RecalcEngine<'a> {
    catalog: &'a dyn Catalog,
    rules: &'a dyn AssociationRules,
    quantity_rules: QuantityRuleRegistry,
    config: EngineConfig,
    guard: RecomputeGuard,
}

impl<'a> RecalcEngine<'a> {
    /// Engine with default settings and the built-in quantity rules.
    pub fn new(catalog: &'a dyn Catalog, rules: &'a dyn AssociationRules) -> Self {
        RecalcEngine {
            catalog,
            rules,
            quantity_rules: QuantityRuleRegistry::with_builtins(),
            config: EngineConfig::default(),
            guard: RecomputeGuard::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_quantity_rules(mut self, registry: QuantityRuleRegistry) -> Self {
        self.quantity_rules = registry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn quantity_rules_mut(&mut self) -> &mut QuantityRuleRegistry {
        &mut self.quantity_rules
    }

    pub fn guard(&self) -> &RecomputeGuard {
        &self.guard
    }

    /// Recalculate every row in place until no more associated rows are needed.
    pub fn recalculate(&self, rows: &mut Vec<Row>, globals: &dyn GlobalSource) -> RecalcReport {
        let Some(_token) = self.guard.try_acquire() else {
            debug!("recalculation already running, skipped");
            return RecalcReport::already_running();
        };

        let globals = globals.globals();
        let mut global_warnings = Vec::new();
        if let Err(error) = globals.validate_globals() {
            warn!(%error, "global variables");
            global_warnings.push(RecalcWarning::general(error));
        }

        renumber(rows);

        let max_iterations = self.config.max_iterations.max(1);
        let mut status = RecalcStatus::IterationCapReached;
        let mut iterations = 0;
        let mut rows_inserted = 0;
        let mut warnings = Vec::new();

        for iteration in 1..=max_iterations {
            iterations = iteration;
            warnings = global_warnings.clone();
            let catalog = CachedCatalog::new(self.catalog);

            self.resolve_pass(rows, &globals, &catalog, &mut warnings);
            self.edge_pass(rows, &catalog, &mut warnings);

            let insertions = collect_insertions(rows, self.rules);
            let added = apply_insertions(rows, &insertions);
            if added > 0 {
                rows_inserted += added;
                warnings = global_warnings.clone();
                self.resolve_pass(rows, &globals, &catalog, &mut warnings);
                self.edge_pass(rows, &catalog, &mut warnings);
            }

            for row in rows.iter_mut() {
                compute_costs(row, &self.config);
            }

            debug!(
                iteration,
                added,
                rows = rows.len(),
                lookups = catalog.cached_references(),
                "pass complete"
            );

            if added == 0 {
                status = RecalcStatus::Converged;
                break;
            }
        }

        if status == RecalcStatus::IterationCapReached {
            warn!(iterations, "expansion did not stabilise");
            warnings.push(RecalcWarning::general(QuoteError::IterationCapExceeded { iterations }));
        }

        info!(
            ?status,
            iterations,
            rows_inserted,
            warnings = warnings.len(),
            "recalculation finished"
        );

        RecalcReport {
            status,
            iterations,
            rows_inserted,
            warnings,
        }
    }

    fn resolve_pass(
        &self,
        rows: &mut [Row],
        globals: &VariableMap,
        catalog: &dyn Catalog,
        warnings: &mut Vec<RecalcWarning>,
    ) {
        let mut tracker = ModuleTracker::new();
        for index in 0..rows.len() {
            if rows[index].is_header() {
                tracker.enter_header(&mut rows[index], globals, warnings);
                continue;
            }
            refresh_catalog_fields(&mut rows[index], catalog, warnings);
            if rows[index].is_associated() {
                apply_quantity_rule(rows, index, &self.quantity_rules, warnings);
            }
            resolve_row(&mut rows[index], tracker.context(), globals, warnings);
        }
    }

    fn edge_pass(&self, rows: &mut [Row], catalog: &dyn Catalog, warnings: &mut Vec<RecalcWarning>) {
        for row in rows.iter_mut() {
            compute_edges(row, catalog, &self.config, warnings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AssociationEntry, AssociationTable, CatalogEntry, MemoryCatalog};
    use crate::row::Unit;

    fn catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog.insert("AGL18", CatalogEntry::new(18.0, 12.0, 0.1).with_family("AGL"));
        catalog.insert("MDF19", CatalogEntry::new(19.0, 15.0, 0.05).with_family("MDF"));
        catalog.insert("ORL-FINE", CatalogEntry::new(0.4, 8.0, 0.0));
        catalog.insert("ORL-THICK", CatalogEntry::new(2.0, 20.0, 0.05));
        catalog.insert("PIN", CatalogEntry::new(0.0, 0.05, 0.0));
        catalog.insert("LAC", CatalogEntry::new(0.0, 9.0, 0.1));
        catalog
    }

    fn rules() -> AssociationTable {
        let mut table = AssociationTable::new();
        table.add("SHELF", AssociationEntry::new("PIN", "double_principal"));
        table.add("DOOR", AssociationEntry::new("HINGE", "double_principal"));
        table.add("DOOR", AssociationEntry::new("HANDLE", "fixed_one"));
        table
    }

    fn globals(h: &str) -> VariableMap {
        VariableMap::from_pairs([("H", h), ("L", "600"), ("P", "560")])
    }

    fn cabinet() -> Vec<Row> {
        vec![
            Row::header().with_dimensions("H", "L", "P").with_qt_mod("2"),
            Row::principal("SIDE", Unit::M2)
                .with_dimensions("HM", "PM", "18")
                .with_description("Side [1000]")
                .with_material("AGL18")
                .with_edges(Some("ORL-FINE"), Some("ORL-THICK")),
            Row::principal("SHELF", Unit::M2)
                .with_dimensions("LM-36", "PM-20", "")
                .with_qt_und(3.0)
                .with_material("AGL18"),
            Row::principal("DOOR", Unit::M2)
                .with_dimensions("HM", "LM/2", "19")
                .with_qt_und(2.0)
                .with_material("MDF19"),
        ]
    }

    #[test]
    fn test_full_pass_inserts_and_costs() {
        let (catalog, rules) = (catalog(), rules());
        let engine = RecalcEngine::new(&catalog, &rules);
        let mut rows = cabinet();

        let report = engine.recalculate(&mut rows, &globals("720"));

        assert_eq!(report.status, RecalcStatus::Converged);
        assert_eq!(report.iterations, 2);
        assert_eq!(report.rows_inserted, 3);

        let codes: Vec<&str> = rows.iter().map(|r| r.definition_code.as_str()).collect();
        assert_eq!(codes, vec!["MODULE", "SIDE", "SHELF", "PIN", "DOOR", "HINGE", "HANDLE"]);
        let ids: Vec<usize> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);

        // multiplier 2 × qt_und 3
        assert_eq!(rows[2].qt_total, 6.0);
        // pin: 2 × principal qt_und 3, then × multiplier 2
        assert_eq!(rows[3].qt_und, 6.0);
        assert_eq!(rows[3].qt_total, 12.0);
        assert_eq!(rows[3].material.price_net, 0.0);
        // hinge: 2 × door qt_und 2
        assert_eq!(rows[5].qt_und, 4.0);
        assert_eq!(rows[6].qt_und, 1.0);

        // side: 0.72 × 0.56 m² × 1.1 × 12.00
        assert_eq!(rows[1].costs.material_unit, 5.32);
        assert_eq!(rows[1].costs.material_total, 10.64);
        assert!(rows[1].edges.total_cost > 0.0);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_second_run_is_stable() {
        let (catalog, rules) = (catalog(), rules());
        let engine = RecalcEngine::new(&catalog, &rules);
        let mut rows = cabinet();

        engine.recalculate(&mut rows, &globals("720"));
        let snapshot = rows.clone();
        let report = engine.recalculate(&mut rows, &globals("720"));

        assert_eq!(report.status, RecalcStatus::Converged);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.rows_inserted, 0);
        assert_eq!(rows, snapshot);
    }

    #[test]
    fn test_terminates_within_default_cap() {
        let catalog = catalog();
        let mut rules = rules();
        rules.add("PIN", AssociationEntry::new("CLIP", "fixed_one"));
        let engine = RecalcEngine::new(&catalog, &rules);

        let mut rows: Vec<Row> = (0..20)
            .map(|_| Row::principal("DOOR", Unit::Und))
            .chain((0..20).map(|_| Row::principal("SHELF", Unit::Und)))
            .collect();
        let report = engine.recalculate(&mut rows, &globals("720"));

        assert!(report.is_converged());
        assert!(report.iterations <= 10);
        assert_eq!(rows.len(), 40 + 20 * 2 + 20);
    }

    #[test]
    fn test_locked_row_survives_global_and_price_changes() {
        let (catalog, rules) = (catalog(), rules());
        let engine = RecalcEngine::new(&catalog, &rules);
        let mut rows = cabinet();
        engine.recalculate(&mut rows, &globals("720"));

        rows[1].locked = true;
        let before = rows[1].clone();

        let mut repriced = MemoryCatalog::new();
        repriced.insert("AGL18", CatalogEntry::new(25.0, 99.0, 0.5));
        let engine = RecalcEngine::new(&repriced, &rules);
        engine.recalculate(&mut rows, &globals("900"));

        let after = &rows[1];
        assert_eq!(after.comp, before.comp);
        assert_eq!(after.larg, before.larg);
        assert_eq!(after.esp, before.esp);
        assert_eq!(after.material, before.material);
        assert_eq!(after.edges.sides, before.edges.sides);

        // the unlocked shelf followed the new globals
        assert_eq!(rows[2].material.price_net, 99.0);
    }

    #[test]
    fn test_iteration_cap_is_a_warning() {
        let (catalog, rules) = (catalog(), rules());
        let config = EngineConfig {
            max_iterations: 1,
            ..Default::default()
        };
        let engine = RecalcEngine::new(&catalog, &rules).with_config(config);
        let mut rows = cabinet();

        let report = engine.recalculate(&mut rows, &globals("720"));

        assert_eq!(report.status, RecalcStatus::IterationCapReached);
        assert_eq!(report.iterations, 1);
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[3].qt_total, 12.0);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.error == QuoteError::IterationCapExceeded { iterations: 1 }));
    }

    #[test]
    fn test_reentrant_call_returns_immediately() {
        let (catalog, rules) = (catalog(), rules());
        let engine = RecalcEngine::new(&catalog, &rules);
        let mut rows = cabinet();

        let token = engine.guard().try_acquire();
        assert!(token.is_some());
        let report = engine.recalculate(&mut rows, &globals("720"));
        assert_eq!(report.status, RecalcStatus::AlreadyRunning);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].id, 0);

        drop(token);
        assert!(!engine.guard().is_busy());
        let report = engine.recalculate(&mut rows, &globals("720"));
        assert!(report.is_converged());
        assert!(!engine.guard().is_busy());
    }

    #[test]
    fn test_row_errors_do_not_stop_other_rows() {
        let (catalog, rules) = (catalog(), rules());
        let engine = RecalcEngine::new(&catalog, &rules);
        let mut rows = vec![
            Row::principal("BACK", Unit::M2)
                .with_dimensions("H/0", "L", "")
                .with_material("AGL18"),
            Row::principal("TOP", Unit::M2)
                .with_dimensions("L", "P", "")
                .with_material("NOPE"),
            Row::principal("BASE", Unit::M2)
                .with_dimensions("L", "P", "")
                .with_material("AGL18"),
        ];

        let report = engine.recalculate(&mut rows, &globals("720"));

        assert!(rows[0].comp.error);
        assert_eq!(rows[0].costs.material_unit, 0.0);
        assert_eq!(rows[1].costs.material_unit, 0.0);
        assert!(rows[2].costs.material_unit > 0.0);

        let codes: Vec<(Option<usize>, &str)> = report
            .warnings
            .iter()
            .map(|w| (w.row, w.error.error_code()))
            .collect();
        assert_eq!(codes, vec![(Some(1), "EVALUATION_ERROR"), (Some(2), "CATALOG_MISS")]);
    }

    #[test]
    fn test_unknown_global_is_reported() {
        let (catalog, rules) = (catalog(), rules());
        let engine = RecalcEngine::new(&catalog, &rules);
        let mut rows = vec![Row::principal("PLINTH", Unit::Ml).with_dimensions("W", "", "")];
        let globals = VariableMap::from_pairs([("W", "600")]);

        let report = engine.recalculate(&mut rows, &globals);

        assert_eq!(report.warnings[0].row, None);
        assert_eq!(report.warnings[0].error.error_code(), "INVALID_INPUT");
        assert_eq!(rows[0].comp.value, Some(600.0));
    }

    #[test]
    fn test_finish_only_family_and_finishes() {
        let (catalog, rules) = (catalog(), rules());
        let config = EngineConfig {
            finish_only_family: Some("MDF".to_string()),
            ..Default::default()
        };
        let engine = RecalcEngine::new(&catalog, &rules).with_config(config);
        let mut panel = Row::principal("PANEL", Unit::M2)
            .with_dimensions("1000", "500", "")
            .with_material("MDF19");
        panel.finishes.top.enabled = true;
        panel.finishes.top.reference = Some("LAC".to_string());
        let mut rows = vec![panel];

        engine.recalculate(&mut rows, &globals("720"));

        assert_eq!(rows[0].costs.material_unit, 0.0);
        // 0.5 m² × 9.00 × 1.1
        assert_eq!(rows[0].costs.finish_top_unit, 4.95);
        assert_eq!(rows[0].costs.total, 4.95);
    }
}
