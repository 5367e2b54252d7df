//! # Module Context Tracker
//!
//! Single forward pass over the breakdown. A header row opens a module scope
//! that lasts until the next header:
//!
//! ```text
//!            header               header
//! NoModule ---------> InModule(A) ---------> InModule(B) ... end
//! ```
//!
//! Entering a scope evaluates the header's own formulas against the globals
//! only (a header never sees `HM/LM/PM`), then publishes its resolved
//! comp/larg/esp as `HM/LM/PM` and its `qt_mod` as the multiplier.

use tracing::debug;

use super::dimensions::{effective_qt_und, resolve_field};
use super::RecalcWarning;
use crate::row::Row;
use crate::variables::{module_variables, VariableMap};

/// Variables and multiplier a header hands to the rows of its scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleContext {
    pub vars: VariableMap,
    /// Header `qt_mod`, at least 1
    pub multiplier: f64,
}

/// Tracker state.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TrackerState {
    #[default]
    NoModule,
    InModule(ModuleContext),
}

#[derive(Debug, Default)]
pub struct ModuleTracker {
    state: TrackerState,
}

impl ModuleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// Active module context, if any.
    pub fn context(&self) -> Option<&ModuleContext> {
        match &self.state {
            TrackerState::NoModule => None,
            TrackerState::InModule(ctx) => Some(ctx),
        }
    }

    /// Resolve a header row and open its scope.
    ///
    /// Locked headers keep their stored resolved values.
    pub fn enter_header(&mut self, row: &mut Row, globals: &VariableMap, warnings: &mut Vec<RecalcWarning>) {
        if !row.locked {
            let layers = [globals];
            row.comp = resolve_field(row.id, "comp", &row.comp_formula, &layers, warnings);
            row.larg = resolve_field(row.id, "larg", &row.larg_formula, &layers, warnings);
            row.esp = resolve_field(row.id, "esp", &row.esp_formula, &layers, warnings);
            row.qt_mod = resolve_field(row.id, "qt_mod", &row.qt_mod_formula, &layers, warnings);
        }

        let multiplier = header_multiplier(row);
        let vars = module_variables(row.comp.value, row.larg.value, row.esp.value);
        row.qt_total = multiplier * effective_qt_und(row);

        debug!(row = row.id, multiplier, vars = vars.len(), "module scope opened");
        self.state = TrackerState::InModule(ModuleContext { vars, multiplier });
    }
}

/// Header `qt_mod`: minimum 1, and 1 when it did not resolve.
fn header_multiplier(row: &Row) -> f64 {
    match row.qt_mod.value {
        Some(v) if !row.qt_mod.error => v.max(1.0),
        _ => 1.0,
    }
}
