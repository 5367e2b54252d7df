//! # Cost Aggregator
//!
//! Per-row costs in four groups: material, machine operations, finishes and
//! edges (computed by [`super::edges`]). `*_unit` values are per piece and
//! `*_total` values are multiplied by `qt_total`.
//!
//! Locking a row freezes the *inputs* (catalog prices, waste, family); the
//! aggregation itself always runs so totals follow the current quantities.
//!
//! ## Material
//!
//! | unit | unit cost                                   |
//! |------|---------------------------------------------|
//! | M2   | comp × larg (m²) × (1 + waste) × price_net  |
//! | ML   | comp (m) × (1 + waste) × price_net          |
//! | UND  | price_net × (1 + waste)                     |
//!
//! ## Machine operations
//!
//! Each category only applies when its base value on the row is ≥ 1.
//!
//! | category     | per-piece cost                                       |
//! |--------------|------------------------------------------------------|
//! | cut          | rate × perimeter (m)                                 |
//! | edge_machine | rate × row edge running length ÷ qt_total            |
//! | handling     | tariff by area: ≤ 0.7 m², < 1.0 m², ≥ 1.0 m²         |
//! | flat         | rate                                                 |
//! | panel_saw    | minutes × hourly tariff / 60                         |
//! | cnc          | minutes × hourly tariff / 60                         |
//! | assembly     | minutes × hourly tariff / 60                         |
//! | volume       | comp × larg × esp (m³) × rate                        |
//!
//! The edge-machine category divides the row's whole running length
//! (already multiplied by `qt_total`) back by `qt_total`.

use tracing::warn;

use super::RecalcWarning;
use crate::catalog::Catalog;
use crate::config::{EngineConfig, MachineTariffs};
use crate::errors::QuoteError;
use crate::row::{FinishSelection, MachineCosts, Row, RowCosts, Unit};
use crate::units::{round2, CubicMeters, Meters, SquareMeters};

/// Pieces up to this area use the small handling tariff.
pub const HANDLING_SMALL_MAX_M2: f64 = 0.7;
/// Pieces below this area use the medium handling tariff.
pub const HANDLING_MEDIUM_MAX_M2: f64 = 1.0;

/// Refresh catalog-sourced material and finish fields of an unlocked row.
pub fn refresh_catalog_fields(row: &mut Row, catalog: &dyn Catalog, warnings: &mut Vec<RecalcWarning>) {
    if row.locked || row.is_header() {
        return;
    }

    if let Some(reference) = row.material.material_ref.clone() {
        match catalog.lookup(&reference) {
            Some(entry) => {
                row.material.price_table = entry.net_price;
                row.material.waste_fraction = entry.waste_fraction;
                row.material.thickness_mm = Some(entry.thickness_mm);
                row.material.family = entry.family;
            }
            None => {
                warn!(row = row.id, reference = %reference, "material reference not in catalog");
                warnings.push(RecalcWarning::for_row(row.id, QuoteError::catalog_miss(reference)));
                row.material.price_table = 0.0;
                row.material.waste_fraction = 0.0;
                row.material.thickness_mm = None;
                row.material.family = None;
            }
        }
    }
    row.material.price_net = round2(
        row.material.price_table * (1.0 + row.material.discount_plus) * (1.0 - row.material.discount_minus),
    );

    let row_id = row.id;
    refresh_finish(row_id, &mut row.finishes.top, catalog, warnings);
    refresh_finish(row_id, &mut row.finishes.bottom, catalog, warnings);
}

fn refresh_finish(row_id: usize, finish: &mut FinishSelection, catalog: &dyn Catalog, warnings: &mut Vec<RecalcWarning>) {
    let Some(reference) = finish.reference.as_deref() else {
        return;
    };
    match catalog.lookup(reference) {
        Some(entry) => {
            finish.price_net = entry.net_price;
            finish.waste_fraction = entry.waste_fraction;
        }
        None => {
            if finish.enabled {
                warnings.push(RecalcWarning::for_row(row_id, QuoteError::catalog_miss(reference)));
            }
            finish.price_net = 0.0;
            finish.waste_fraction = 0.0;
        }
    }
}

/// Area of one piece in m².
fn piece_area(row: &Row) -> SquareMeters {
    SquareMeters::of_rectangle(row.comp_mm(), row.larg_mm())
}

/// Whether material is priced on this row at all.
///
/// M2 rows of the finish-only family are priced through their finishes.
pub fn material_applies(row: &Row, config: &EngineConfig) -> bool {
    if row.unit != Unit::M2 {
        return true;
    }
    match (&config.finish_only_family, &row.material.family) {
        (Some(skip), Some(family)) => skip != family,
        _ => true,
    }
}

/// Material cost per piece.
pub fn material_unit_cost(row: &Row, config: &EngineConfig) -> f64 {
    if !material_applies(row, config) || row.material.supplied_by_others {
        return 0.0;
    }
    let waste = 1.0 + row.material.waste_fraction;
    let price = row.material.price_net;
    let cost = match row.unit {
        Unit::M2 => (piece_area(row) * waste).value() * price,
        Unit::Ml => (Meters::from(row.comp_mm()) * waste).value() * price,
        Unit::Und => price * waste,
    };
    round2(cost)
}

fn gated(value: f64) -> bool {
    value >= 1.0
}

/// Per-piece cost of each machine category.
pub fn machine_unit_costs(row: &Row, tariffs: &MachineTariffs) -> MachineCosts {
    let ops = &row.operations;
    let area = piece_area(row).value();
    let perimeter = ((Meters::from(row.comp_mm()) + Meters::from(row.larg_mm())) * 2.0).value();

    let cut = if gated(ops.cut_rate) { ops.cut_rate * perimeter } else { 0.0 };

    let edge_machine = if gated(ops.edge_machine_rate) && row.qt_total > 0.0 {
        ops.edge_machine_rate * row.edges.total_length_m / row.qt_total
    } else {
        0.0
    };

    let handling = if gated(ops.handling) {
        if area <= HANDLING_SMALL_MAX_M2 {
            tariffs.handling_small
        } else if area < HANDLING_MEDIUM_MAX_M2 {
            tariffs.handling_medium
        } else {
            tariffs.handling_large
        }
    } else {
        0.0
    };

    let flat = if gated(ops.flat_rate) { ops.flat_rate } else { 0.0 };

    let timed = |minutes: f64, hourly: f64| if gated(minutes) { minutes * hourly / 60.0 } else { 0.0 };

    let volume = if gated(ops.volume_rate) {
        (CubicMeters::of_block(row.comp_mm(), row.larg_mm(), row.thickness_mm()) * ops.volume_rate).value()
    } else {
        0.0
    };

    MachineCosts {
        cut: round2(cut),
        edge_machine: round2(edge_machine),
        handling: round2(handling),
        flat: round2(flat),
        panel_saw: round2(timed(ops.panel_saw_minutes, tariffs.panel_saw_hourly)),
        cnc: round2(timed(ops.cnc_minutes, tariffs.cnc_hourly)),
        assembly: round2(timed(ops.assembly_minutes, tariffs.assembly_hourly)),
        volume: round2(volume),
    }
}

/// Gate finishes on the material family; clears both checkboxes on mismatch.
pub fn finish_unit_costs(row: &mut Row, config: &EngineConfig) -> (f64, f64) {
    let family_matches = row.material.family.as_deref() == Some(config.finish_family.as_str());
    if !family_matches {
        row.finishes.top.enabled = false;
        row.finishes.bottom.enabled = false;
        return (0.0, 0.0);
    }
    let area = piece_area(row).value();
    let face = |finish: &FinishSelection| {
        if finish.enabled {
            round2(area * finish.price_net * (1.0 + finish.waste_fraction))
        } else {
            0.0
        }
    };
    (face(&row.finishes.top), face(&row.finishes.bottom))
}

/// Recompute every cost output of a row.
pub fn compute_costs(row: &mut Row, config: &EngineConfig) {
    if row.is_header() {
        row.costs = RowCosts::default();
        return;
    }

    let qt_total = row.qt_total;
    let material_unit = material_unit_cost(row, config);
    let machine = machine_unit_costs(row, &config.tariffs);
    let machine_unit = if row.skip_machine_costs { 0.0 } else { round2(machine.sum()) };
    let (finish_top_unit, finish_bottom_unit) = finish_unit_costs(row, config);
    let finish_unit = round2(finish_top_unit + finish_bottom_unit);

    let material_total = round2(material_unit * qt_total);
    let machine_total = round2(machine_unit * qt_total);
    let finish_total = round2(finish_unit * qt_total);
    let edge_total = row.edges.total_cost;

    row.costs = RowCosts {
        material_unit,
        material_total,
        machine,
        machine_unit,
        machine_total,
        finish_top_unit,
        finish_bottom_unit,
        finish_unit,
        finish_total,
        edge_total,
        total: round2(material_total + machine_total + finish_total + edge_total),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, MemoryCatalog};
    use crate::row::Resolved;

    fn sized(unit: Unit, comp: f64, larg: f64, esp: f64, qt_total: f64) -> Row {
        let mut row = Row::principal("PANEL", unit);
        row.comp = Resolved::ok(comp, "");
        row.larg = Resolved::ok(larg, "");
        row.esp = Resolved::ok(esp, "");
        row.qt_total = qt_total;
        row
    }

    fn priced(mut row: Row, price: f64, waste: f64) -> Row {
        row.material.price_net = price;
        row.material.waste_fraction = waste;
        row
    }

    #[test]
    fn test_material_by_unit() {
        let config = EngineConfig::default();

        let m2 = priced(sized(Unit::M2, 2000.0, 500.0, 18.0, 1.0), 10.0, 0.1);
        assert_eq!(material_unit_cost(&m2, &config), 11.0);

        let ml = priced(sized(Unit::Ml, 2500.0, 0.0, 0.0, 1.0), 4.0, 0.0);
        assert_eq!(material_unit_cost(&ml, &config), 10.0);

        let und = priced(sized(Unit::Und, 0.0, 0.0, 0.0, 1.0), 3.5, 0.2);
        assert_eq!(material_unit_cost(&und, &config), 4.2);
    }

    #[test]
    fn test_material_supplied_by_others() {
        let mut row = priced(sized(Unit::M2, 1000.0, 1000.0, 18.0, 1.0), 10.0, 0.0);
        row.material.supplied_by_others = true;
        assert_eq!(material_unit_cost(&row, &EngineConfig::default()), 0.0);
    }

    #[test]
    fn test_finish_only_family_skips_material() {
        let config = EngineConfig {
            finish_only_family: Some("LAC".to_string()),
            ..Default::default()
        };
        let mut row = priced(sized(Unit::M2, 1000.0, 1000.0, 18.0, 1.0), 10.0, 0.0);
        row.material.family = Some("LAC".to_string());
        assert!(!material_applies(&row, &config));
        assert_eq!(material_unit_cost(&row, &config), 0.0);

        row.unit = Unit::Und;
        assert!(material_applies(&row, &config));
    }

    #[test]
    fn test_machine_gates() {
        let mut row = sized(Unit::M2, 1000.0, 500.0, 18.0, 1.0);
        row.operations.cut_rate = 0.5;
        row.operations.flat_rate = 0.0;
        let costs = machine_unit_costs(&row, &MachineTariffs::default());
        assert_eq!(costs.sum(), 0.0);

        row.operations.cut_rate = 2.0;
        row.operations.flat_rate = 3.0;
        let costs = machine_unit_costs(&row, &MachineTariffs::default());
        // perimeter 2 × (1.0 + 0.5) = 3 m
        assert_eq!(costs.cut, 6.0);
        assert_eq!(costs.flat, 3.0);
    }

    #[test]
    fn test_handling_buckets() {
        let tariffs = MachineTariffs::default();
        let mut row = sized(Unit::M2, 1000.0, 700.0, 18.0, 1.0);
        row.operations.handling = 1.0;
        assert_eq!(machine_unit_costs(&row, &tariffs).handling, tariffs.handling_small);

        row.larg = Resolved::ok(900.0, "");
        assert_eq!(machine_unit_costs(&row, &tariffs).handling, tariffs.handling_medium);

        row.larg = Resolved::ok(1000.0, "");
        assert_eq!(machine_unit_costs(&row, &tariffs).handling, tariffs.handling_large);
    }

    #[test]
    fn test_timed_and_volume_categories() {
        let tariffs = MachineTariffs {
            panel_saw_hourly: 60.0,
            cnc_hourly: 120.0,
            assembly_hourly: 30.0,
            ..Default::default()
        };
        let mut row = sized(Unit::M2, 2000.0, 500.0, 20.0, 1.0);
        row.operations.panel_saw_minutes = 3.0;
        row.operations.cnc_minutes = 1.5;
        row.operations.assembly_minutes = 0.5;
        row.operations.volume_rate = 400.0;

        let costs = machine_unit_costs(&row, &tariffs);
        assert_eq!(costs.panel_saw, 3.0);
        assert_eq!(costs.cnc, 3.0);
        assert_eq!(costs.assembly, 0.0);
        // 2.0 × 0.5 × 0.02 m³ × 400
        assert_eq!(costs.volume, 8.0);
    }

    #[test]
    fn test_edge_machine_divides_running_total_by_quantity() {
        // Replicated as-is: the running length already includes qt_total,
        // and the per-piece cost divides it back out.
        let mut row = sized(Unit::M2, 1000.0, 500.0, 18.0, 4.0);
        row.edges.total_length_m = 12.0;
        row.operations.edge_machine_rate = 1.5;
        let costs = machine_unit_costs(&row, &MachineTariffs::default());
        assert_eq!(costs.edge_machine, 4.5);

        row.qt_total = 0.0;
        assert_eq!(machine_unit_costs(&row, &MachineTariffs::default()).edge_machine, 0.0);
    }

    #[test]
    fn test_skip_machine_costs_zeroes_sum() {
        let mut row = sized(Unit::M2, 1000.0, 500.0, 18.0, 2.0);
        row.operations.flat_rate = 5.0;
        row.skip_machine_costs = true;
        compute_costs(&mut row, &EngineConfig::default());
        assert_eq!(row.costs.machine.flat, 5.0);
        assert_eq!(row.costs.machine_unit, 0.0);
        assert_eq!(row.costs.machine_total, 0.0);
    }

    #[test]
    fn test_finishes_gated_by_family() {
        let config = EngineConfig::default();
        let mut row = sized(Unit::M2, 1000.0, 500.0, 18.0, 2.0);
        row.finishes.top.enabled = true;
        row.finishes.top.price_net = 20.0;
        row.finishes.top.waste_fraction = 0.1;
        row.finishes.bottom.enabled = true;
        row.finishes.bottom.price_net = 10.0;

        row.material.family = Some("MDF".to_string());
        compute_costs(&mut row, &config);
        assert_eq!(row.costs.finish_top_unit, 11.0);
        assert_eq!(row.costs.finish_bottom_unit, 5.0);
        assert_eq!(row.costs.finish_total, 32.0);

        row.material.family = Some("AGL".to_string());
        compute_costs(&mut row, &config);
        assert_eq!(row.costs.finish_total, 0.0);
        assert!(!row.finishes.top.enabled);
        assert!(!row.finishes.bottom.enabled);
    }

    #[test]
    fn test_row_totals() {
        let mut row = priced(sized(Unit::M2, 1000.0, 1000.0, 18.0, 3.0), 10.0, 0.0);
        row.operations.flat_rate = 2.0;
        row.edges.total_cost = 1.25;
        compute_costs(&mut row, &EngineConfig::default());

        assert_eq!(row.costs.material_unit, 10.0);
        assert_eq!(row.costs.material_total, 30.0);
        assert_eq!(row.costs.machine_total, 6.0);
        assert_eq!(row.costs.edge_total, 1.25);
        assert_eq!(row.costs.total, 37.25);
    }

    #[test]
    fn test_refresh_applies_discounts_and_skips_locked() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert("AGL18", CatalogEntry::new(18.0, 20.0, 0.1).with_family("AGL"));

        let mut row = Row::principal("SIDE", Unit::M2).with_material("AGL18");
        row.material.discount_plus = 0.10;
        row.material.discount_minus = 0.50;
        let mut warnings = Vec::new();
        refresh_catalog_fields(&mut row, &catalog, &mut warnings);

        assert_eq!(row.material.price_table, 20.0);
        assert_eq!(row.material.price_net, 11.0);
        assert_eq!(row.material.thickness_mm, Some(18.0));
        assert_eq!(row.material.family.as_deref(), Some("AGL"));

        let mut cheaper = MemoryCatalog::new();
        cheaper.insert("AGL18", CatalogEntry::new(18.0, 1.0, 0.0));
        row.locked = true;
        refresh_catalog_fields(&mut row, &cheaper, &mut warnings);
        assert_eq!(row.material.price_net, 11.0);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_refresh_catalog_miss() {
        let mut row = Row::principal("SIDE", Unit::M2).with_material("NOPE");
        row.material.price_table = 99.0;
        let mut warnings = Vec::new();
        refresh_catalog_fields(&mut row, &MemoryCatalog::new(), &mut warnings);
        assert_eq!(row.material.price_net, 0.0);
        assert_eq!(warnings[0].error, QuoteError::catalog_miss("NOPE"));
    }

    #[test]
    fn test_material_change_clears_family_and_finishes() {
        let config = EngineConfig::default();
        let mut catalog = MemoryCatalog::new();
        catalog.insert("MDF18", CatalogEntry::new(18.0, 10.0, 0.0).with_family("MDF"));
        catalog.insert("PLY18", CatalogEntry::new(18.0, 12.0, 0.0));
        catalog.insert("LAC", CatalogEntry::new(0.0, 9.0, 0.0));

        let mut row = sized(Unit::M2, 1000.0, 500.0, 18.0, 1.0).with_material("MDF18");
        row.finishes.top.enabled = true;
        row.finishes.top.reference = Some("LAC".to_string());
        let mut warnings = Vec::new();
        refresh_catalog_fields(&mut row, &catalog, &mut warnings);
        compute_costs(&mut row, &config);
        assert_eq!(row.material.family.as_deref(), Some("MDF"));
        assert_eq!(row.costs.finish_top_unit, 4.5);

        row.material.material_ref = Some("PLY18".to_string());
        refresh_catalog_fields(&mut row, &catalog, &mut warnings);
        compute_costs(&mut row, &config);
        assert_eq!(row.material.family, None);
        assert_eq!(row.costs.finish_total, 0.0);
        assert!(!row.finishes.top.enabled);

        row.material.family = Some("MDF".to_string());
        row.material.material_ref = Some("MISSING".to_string());
        refresh_catalog_fields(&mut row, &catalog, &mut warnings);
        compute_costs(&mut row, &config);
        assert_eq!(row.material.family, None);
        assert_eq!(row.costs.finish_total, 0.0);
        assert!(warnings.iter().any(|w| w.error == QuoteError::catalog_miss("MISSING")));
    }
}
