//! # Associated-Component Expander
//!
//! Some pieces imply others: a shelf needs support pins, a door needs hinges.
//! An association rule lists, for a principal definition code, up to three
//! associated codes and the name of the rule that derives their quantity.
//!
//! ## Blocks
//!
//! A principal's *block* is the run of rows that follow it up to the next
//! principal or header. Associated rows have no stored parent pointer; the
//! relation is recomputed from position on every pass by
//! [`find_governing_row`], because inserting rows shifts every index after
//! the insertion point.
//!
//! ```text
//! 4  SHELF        <- principal
//! 5    SUPPORT    <- associated, governed by row 4
//! 6    SCREW      <- associated, governed by row 4
//! 7  DOOR         <- next principal ends the block
//! ```
//!
//! Expansion only inserts what is missing: running it on a stable sequence
//! yields no insertions.
//!
//! ## Quantity rules
//!
//! Associated quantities come from a [`QuantityRuleRegistry`] of named pure
//! functions `(principal, preceding siblings) -> qt_und`. New rules are added
//! by registering them; the expander never changes.

use std::collections::HashMap;

use tracing::debug;

use super::RecalcWarning;
use crate::catalog::{AssociationEntry, AssociationRules};
use crate::errors::QuoteError;
use crate::row::{renumber, AssociatedSlot, Row, MAX_ASSOCIATED};

/// A quantity derivation rule.
pub type QuantityRule = Box<dyn Fn(&Row, &[&Row]) -> f64>;

/// Registry of named quantity rules.
pub struct QuantityRuleRegistry {
    rules: HashMap<String, QuantityRule>,
}

impl Default for QuantityRuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for QuantityRuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("QuantityRuleRegistry").field("rules", &names).finish()
    }
}

impl QuantityRuleRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        QuantityRuleRegistry { rules: HashMap::new() }
    }

    /// Registry with the built-in rules:
    ///
    /// - `fixed_one` - always 1
    /// - `match_principal` - the principal's `qt_und`
    /// - `double_principal` - twice the principal's `qt_und`
    /// - `double_sibling` - twice the nearest preceding sibling's `qt_und`
    ///   (the principal's when there is none)
    /// - `principal_length_m` - the principal's comp in metres × its `qt_und`
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("fixed_one", |_, _| 1.0);
        registry.register("match_principal", |principal, _| principal.qt_und);
        registry.register("double_principal", |principal, _| 2.0 * principal.qt_und);
        registry.register("double_sibling", |principal, siblings| {
            let source = siblings.last().copied().unwrap_or(principal);
            2.0 * source.qt_und
        });
        registry.register("principal_length_m", |principal, _| {
            principal.comp.or_zero() / 1000.0 * principal.qt_und
        });
        registry
    }

    /// Register (or replace) a rule.
    pub fn register<F>(&mut self, name: impl Into<String>, rule: F) -> Option<QuantityRule>
    where
        F: Fn(&Row, &[&Row]) -> f64 + 'static,
    {
        self.rules.insert(name.into(), Box::new(rule))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Apply a rule. `None` when the name is not registered.
    pub fn apply(&self, name: &str, principal: &Row, siblings: &[&Row]) -> Option<f64> {
        self.rules.get(name).map(|rule| rule(principal, siblings))
    }
}

/// Index of the principal governing the associated row at `index`.
///
/// Scans backwards for the nearest row that is not associated. Returns
/// `None` for rows that are not associated, or when that nearest row is a
/// header (an orphaned associated row).
pub fn find_governing_row(rows: &[Row], index: usize) -> Option<usize> {
    if !rows.get(index)?.is_associated() {
        return None;
    }
    let governing = rows[..index].iter().rposition(|row| !row.is_associated())?;
    rows[governing].is_principal().then_some(governing)
}

/// One past the last row of the principal's block.
pub fn block_end(rows: &[Row], principal_index: usize) -> usize {
    rows.iter()
        .enumerate()
        .skip(principal_index + 1)
        .find(|(_, row)| !row.is_associated())
        .map(|(index, _)| index)
        .unwrap_or(rows.len())
}

/// A row the expander wants inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct Insertion {
    /// Index of the governing principal when the request was made
    pub principal_index: usize,
    /// Position the new row goes to (end of the principal's block)
    pub insert_at: usize,
    pub entry: AssociationEntry,
}

/// Store the rule's associated components in an unlocked principal's slots.
pub fn refresh_slots(row: &mut Row, rules: &dyn AssociationRules) {
    if row.locked || !row.is_principal() {
        return;
    }
    let entries = rules.rules_for(&row.definition_code);
    if entries.is_empty() {
        debug!(
            row = row.id,
            error = %QuoteError::rule_miss(row.definition_code.as_str()),
            "no associated components"
        );
    }
    row.associated = entries
        .into_iter()
        .take(MAX_ASSOCIATED)
        .map(|entry| AssociatedSlot {
            code: entry.associated_code,
            quantity_rule: entry.quantity_rule,
        })
        .collect();
}

/// Insertions needed for one principal, given its slots.
///
/// Locked principals build rows from their stored slots alone; unlocked ones
/// re-read the rules for units, descriptions and materials.
pub fn plan_insertions(rows: &[Row], principal_index: usize, rules: &dyn AssociationRules) -> Vec<Insertion> {
    let principal = &rows[principal_index];
    let end = block_end(rows, principal_index);
    let block = &rows[principal_index + 1..end];
    let templates = if principal.locked {
        Vec::new()
    } else {
        rules.rules_for(&principal.definition_code)
    };

    let mut required: Vec<(&AssociatedSlot, usize)> = Vec::new();
    for slot in &principal.associated {
        match required.iter_mut().find(|(s, _)| s.code == slot.code) {
            Some((_, count)) => *count += 1,
            None => required.push((slot, 1)),
        }
    }

    let mut insertions = Vec::new();
    for (slot, needed) in required {
        let existing = block
            .iter()
            .filter(|row| row.is_associated() && row.definition_code == slot.code)
            .count();
        let entry = templates
            .iter()
            .find(|t| t.associated_code == slot.code)
            .cloned()
            .unwrap_or_else(|| AssociationEntry::new(slot.code.clone(), slot.quantity_rule.clone()));

        for _ in existing..needed {
            insertions.push(Insertion {
                principal_index,
                insert_at: end,
                entry: entry.clone(),
            });
        }
    }
    insertions
}

/// Refresh slots and collect insertions for every principal row.
pub fn collect_insertions(rows: &mut [Row], rules: &dyn AssociationRules) -> Vec<Insertion> {
    let mut insertions = Vec::new();
    for index in 0..rows.len() {
        if !rows[index].is_principal() {
            continue;
        }
        refresh_slots(&mut rows[index], rules);
        insertions.extend(plan_insertions(rows, index, rules));
    }
    insertions
}

/// Materialise insertions and renumber. Returns the number of rows added.
///
/// Insertions must be in ascending `insert_at` order, as
/// [`collect_insertions`] produces them; rows for the same block keep
/// their slot order.
pub fn apply_insertions(rows: &mut Vec<Row>, insertions: &[Insertion]) -> usize {
    for insertion in insertions.iter().rev() {
        let entry = &insertion.entry;
        let mut row = Row::associated(entry.associated_code.clone(), entry.quantity_rule.clone(), entry.unit)
            .with_description(entry.description.clone());
        row.material.material_ref = entry.material_ref.clone();
        debug!(
            principal = insertion.principal_index + 1,
            code = %entry.associated_code,
            "inserting associated row"
        );
        rows.insert(insertion.insert_at, row);
    }
    if !insertions.is_empty() {
        renumber(rows);
    }
    insertions.len()
}

/// Derive `qt_und` of the associated row at `index` from its rule.
///
/// Locked rows and rows without a governing principal are left alone.
pub fn apply_quantity_rule(
    rows: &mut [Row],
    index: usize,
    registry: &QuantityRuleRegistry,
    warnings: &mut Vec<RecalcWarning>,
) {
    if rows[index].locked {
        return;
    }
    let Some(rule) = rows[index].quantity_rule.clone() else {
        return;
    };
    let Some(governing) = find_governing_row(rows, index) else {
        return;
    };

    let siblings: Vec<&Row> = rows[governing + 1..index].iter().collect();
    match registry.apply(&rule, &rows[governing], &siblings) {
        Some(quantity) => rows[index].qt_und = quantity,
        None => warnings.push(RecalcWarning::for_row(
            rows[index].id,
            QuoteError::UnknownQuantityRule { rule },
        )),
    }
}
