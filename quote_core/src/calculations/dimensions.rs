//! # Dimension & Quantity Resolver
//!
//! Resolves a row's comp/larg/esp formulas and its quantity total.
//!
//! ## Unit Requirements
//!
//! | unit | comp     | larg     | esp                    |
//! |------|----------|----------|------------------------|
//! | UND  | not used | not used | not used               |
//! | ML   | required | optional | optional, never warned |
//! | M2   | required | required | optional, never warned |
//!
//! Module variables are searched before globals. Successful values are
//! rounded to 2 decimals; failures flag the cell and leave it empty.
//!
//! ## Quantities
//!
//! ```text
//! inside a module:   qt_total = multiplier × qt_und
//! outside a module:  qt_total = qt_mod × qt_und      (qt_mod ≤ 0 or invalid → 1)
//! ```
//!
//! `qt_und ≤ 0` counts as 1. Locked rows skip formulas but still get a fresh
//! `qt_total`, since the module around them may have changed.

use super::module_context::ModuleContext;
use super::RecalcWarning;
use crate::errors::QuoteError;
use crate::formula::{evaluate, substitute};
use crate::row::{Resolved, Row};
use crate::units::round2;
use crate::variables::VariableMap;

/// Evaluate one formula cell, recording a warning on failure.
pub fn resolve_field(
    row_id: usize,
    field: &str,
    formula: &str,
    layers: &[&VariableMap],
    warnings: &mut Vec<RecalcWarning>,
) -> Resolved {
    match evaluate(formula, layers) {
        Ok(Some(value)) => {
            let value = round2(value);
            let shown = substitute(formula, layers).unwrap_or_else(|_| formula.to_string());
            Resolved::ok(value, format!("{} = {} = {:.2}", formula.trim(), shown.trim(), value))
        }
        Ok(None) => Resolved::empty(),
        Err(source) => {
            let trail = format!("{}: {}", formula.trim(), source);
            warnings.push(RecalcWarning::for_row(row_id, QuoteError::evaluation(field, formula, source)));
            Resolved::failed(trail)
        }
    }
}

/// `qt_und`, or 1 when it is not positive.
pub fn effective_qt_und(row: &Row) -> f64 {
    if row.qt_und > 0.0 {
        row.qt_und
    } else {
        1.0
    }
}

/// Resolve a non-header row against its module context and the globals.
pub fn resolve_row(
    row: &mut Row,
    context: Option<&ModuleContext>,
    globals: &VariableMap,
    warnings: &mut Vec<RecalcWarning>,
) {
    if !row.locked {
        resolve_formulas(row, context, globals, warnings);
        if row.qt_und <= 0.0 {
            row.qt_und = 1.0;
        }
    }
    row.qt_total = quantity_total(row, context);
}

fn resolve_formulas(
    row: &mut Row,
    context: Option<&ModuleContext>,
    globals: &VariableMap,
    warnings: &mut Vec<RecalcWarning>,
) {
    let empty = VariableMap::new();
    let module_vars = context.map(|ctx| &ctx.vars).unwrap_or(&empty);
    let layers = [module_vars, globals];

    if row.unit.resolves_dimensions() {
        row.comp = resolve_field(row.id, "comp", &row.comp_formula, &layers, warnings);
        row.larg = resolve_field(row.id, "larg", &row.larg_formula, &layers, warnings);
        row.esp = resolve_field(row.id, "esp", &row.esp_formula, &layers, warnings);
    } else {
        row.comp = Resolved::empty();
        row.larg = Resolved::empty();
        row.esp = Resolved::empty();
    }

    if row.unit.requires_comp() && row.comp_formula.trim().is_empty() {
        warnings.push(RecalcWarning::for_row(row.id, QuoteError::missing_field("comp")));
    }
    if row.unit.requires_larg() && row.larg_formula.trim().is_empty() {
        warnings.push(RecalcWarning::for_row(row.id, QuoteError::missing_field("larg")));
    }

    row.qt_mod = if context.is_some() {
        // The module multiplier replaces the row's own qt_mod.
        Resolved::empty()
    } else {
        resolve_field(row.id, "qt_mod", &row.qt_mod_formula, &layers, warnings)
    };
}

/// Quantity total for a non-header row.
pub fn quantity_total(row: &Row, context: Option<&ModuleContext>) -> f64 {
    let qt_und = effective_qt_und(row);
    match context {
        Some(ctx) => ctx.multiplier * qt_und,
        None => {
            let qt_mod = match row.qt_mod.value {
                Some(v) if v > 0.0 && !row.qt_mod.error => v,
                _ => 1.0,
            };
            qt_mod * qt_und
        }
    }
}
