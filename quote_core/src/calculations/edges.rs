//! # Edge-Banding Calculator
//!
//! A piece's banding is described by a 4-digit profile code in brackets
//! somewhere in its description, e.g. `"Shelf [1100]"`. One digit per side:
//!
//! ```text
//! [ 1  1  0  2 ]
//!   |  |  |  +-- side 4, along larg: thick edge
//!   |  |  +----- side 3, along larg: no edge
//!   |  +-------- side 2, along comp: fine edge
//!   +----------- side 1, along comp: fine edge
//! ```
//!
//! Edges are priced per area in the catalog and converted to a running-metre
//! price by a factor chosen from the **piece** thickness:
//!
//! | piece thickness | factor |
//! |-----------------|--------|
//! | < 20 mm         | 43     |
//! | < 31 mm         | 28     |
//! | < 40 mm         | 22     |
//! | otherwise       | 16     |
//!
//! ```text
//! running length (m) = side (mm) / 1000 × qt_total
//! side cost          = running length × price / factor × (1 + waste)
//! ```
//!
//! A missing or zero catalog waste uses the configured default (10 %).

use tracing::warn;

use super::RecalcWarning;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::errors::QuoteError;
use crate::row::{EdgeBanding, EdgeSide, Row};
use crate::units::{round2, round3, Meters, Millimeters};

/// Profile used when a description carries none.
pub const NO_EDGE_PROFILE: &str = "0000";

/// Extract the `[dddd]` profile code from a description.
pub fn profile_code(description: &str) -> String {
    regex!(r"\[(\d{4})\]")
        .captures(description)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| NO_EDGE_PROFILE.to_string())
}

/// Area-to-running-metre factor for a piece thickness (≈ 1000 / edge width).
pub fn thickness_factor(piece_thickness: Millimeters) -> f64 {
    let t = piece_thickness.value();
    if t < 20.0 {
        43.0
    } else if t < 31.0 {
        28.0
    } else if t < 40.0 {
        22.0
    } else {
        16.0
    }
}

/// Which reference a profile digit selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeChoice {
    None,
    Fine,
    Thick,
}

impl EdgeChoice {
    pub fn from_digit(digit: char) -> Self {
        match digit {
            '0' => EdgeChoice::None,
            '1' => EdgeChoice::Fine,
            _ => EdgeChoice::Thick,
        }
    }
}

/// Recompute the four edge sides of a row.
///
/// Locked rows keep each side's stored reference, thickness, price and
/// waste; only lengths and costs are recomputed.
pub fn compute_edges(row: &mut Row, catalog: &dyn Catalog, config: &EngineConfig, warnings: &mut Vec<RecalcWarning>) {
    if row.is_header() {
        row.edges = EdgeBanding::default();
        return;
    }

    let profile = profile_code(&row.description);

    if row.no_edge {
        row.edges = EdgeBanding {
            profile,
            ..Default::default()
        };
        return;
    }

    let factor = thickness_factor(row.thickness_mm());
    let side_lengths = [row.comp_mm(), row.comp_mm(), row.larg_mm(), row.larg_mm()];
    let digits: Vec<char> = profile.chars().collect();

    let mut sides = row.edges.sides.clone();
    for (index, side) in sides.iter_mut().enumerate() {
        if !row.locked {
            let choice = EdgeChoice::from_digit(digits.get(index).copied().unwrap_or('0'));
            refresh_side_reference(row, side, choice, catalog, warnings);
        }
        price_side(side, index, side_lengths[index], row.qt_total, factor, config);
    }

    let total_length_m = round3(sides.iter().map(|s| s.running_length_m).sum());
    let total_cost = round2(sides.iter().map(|s| s.cost).sum());

    row.edges = EdgeBanding {
        profile,
        sides,
        total_length_m,
        total_cost,
    };
}

/// Pull the catalog snapshot for one side.
fn refresh_side_reference(
    row: &Row,
    side: &mut EdgeSide,
    choice: EdgeChoice,
    catalog: &dyn Catalog,
    warnings: &mut Vec<RecalcWarning>,
) {
    let (reference, field) = match choice {
        EdgeChoice::None => {
            *side = EdgeSide::default();
            return;
        }
        EdgeChoice::Fine => (row.edge_refs.fine.clone(), "edge_refs.fine"),
        EdgeChoice::Thick => (row.edge_refs.thick.clone(), "edge_refs.thick"),
    };

    let Some(reference) = reference else {
        warnings.push(RecalcWarning::for_row(row.id, QuoteError::missing_field(field)));
        *side = EdgeSide::default();
        return;
    };

    match catalog.lookup(&reference) {
        Some(entry) => {
            side.thickness_mm = entry.thickness_mm;
            side.price_per_area = entry.net_price;
            side.waste_fraction = entry.waste_fraction;
        }
        None => {
            warn!(row = row.id, reference = %reference, "edge reference not in catalog");
            warnings.push(RecalcWarning::for_row(row.id, QuoteError::catalog_miss(reference.as_str())));
            side.thickness_mm = 0.0;
            side.price_per_area = 0.0;
            side.waste_fraction = 0.0;
        }
    }
    side.reference = Some(reference);
}

fn price_side(side: &mut EdgeSide, index: usize, length: Millimeters, qt_total: f64, factor: f64, config: &EngineConfig) {
    if side.reference.is_none() {
        side.running_length_m = 0.0;
        side.cost = 0.0;
        side.trail = format!("side {}: no edge", index + 1);
        return;
    }

    let waste = if side.waste_fraction > 0.0 {
        side.waste_fraction
    } else {
        config.default_edge_waste
    };
    let running = (Meters::from(length) * qt_total).value();
    let cost = running * (side.price_per_area / factor) * (1.0 + waste);

    side.running_length_m = round3(running);
    side.cost = round2(cost);
    side.trail = format!(
        "side {}: {:.0} mm / 1000 × {} = {:.3} m; {:.3} m × ({:.2} / {}) × {:.2} = {:.2}",
        index + 1,
        length.value(),
        qt_total,
        side.running_length_m,
        side.running_length_m,
        side.price_per_area,
        factor,
        1.0 + waste,
        side.cost
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, MemoryCatalog};
    use crate::row::{Resolved, Unit};

    fn catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog.insert("ORL-FINE", CatalogEntry::new(0.4, 8.0, 0.0));
        catalog.insert("ORL-THICK", CatalogEntry::new(2.0, 20.0, 0.05));
        catalog
    }

    fn piece(description: &str, comp: f64, larg: f64, esp: f64, qt_total: f64) -> Row {
        let mut row = Row::principal("SHELF", Unit::M2)
            .with_description(description)
            .with_edges(Some("ORL-FINE"), Some("ORL-THICK"));
        row.comp = Resolved::ok(comp, "");
        row.larg = Resolved::ok(larg, "");
        row.esp = Resolved::ok(esp, "");
        row.qt_total = qt_total;
        row
    }

    #[test]
    fn test_profile_code_extraction() {
        assert_eq!(profile_code("Shelf [1102] white"), "1102");
        assert_eq!(profile_code("Shelf"), "0000");
        assert_eq!(profile_code("Shelf [12]"), "0000");
        assert_eq!(profile_code("[abcd] [2000]"), "2000");
    }

    #[test]
    fn test_thickness_buckets() {
        assert_eq!(thickness_factor(Millimeters(18.0)), 43.0);
        assert_eq!(thickness_factor(Millimeters(20.0)), 28.0);
        assert_eq!(thickness_factor(Millimeters(30.0)), 28.0);
        assert_eq!(thickness_factor(Millimeters(31.0)), 22.0);
        assert_eq!(thickness_factor(Millimeters(40.0)), 16.0);
    }

    #[test]
    fn test_edge_cost_worked_example() {
        // 18 mm piece, 1000 mm side, qt_total 2, price 8.00, catalog waste 0 → default 10 %
        let mut row = piece("Shelf [1000]", 1000.0, 400.0, 18.0, 2.0);
        let mut warnings = Vec::new();
        compute_edges(&mut row, &catalog(), &EngineConfig::default(), &mut warnings);

        let side = &row.edges.sides[0];
        assert_eq!(side.running_length_m, 2.0);
        assert_eq!(side.cost, 0.41);
        assert!(side.trail.contains("0.41"));
        assert_eq!(row.edges.total_cost, 0.41);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_digits_choose_fine_or_thick() {
        let mut row = piece("Panel [1203]", 1000.0, 500.0, 18.0, 1.0);
        let mut warnings = Vec::new();
        compute_edges(&mut row, &catalog(), &EngineConfig::default(), &mut warnings);

        let refs: Vec<Option<&str>> = row.edges.sides.iter().map(|s| s.reference.as_deref()).collect();
        assert_eq!(refs, vec![Some("ORL-FINE"), Some("ORL-THICK"), None, Some("ORL-THICK")]);
        assert_eq!(row.edges.sides[2].cost, 0.0);
        // side 2: 1.0 m × 20 / 43 × 1.05
        assert_eq!(row.edges.sides[1].cost, 0.49);
        assert_eq!(row.edges.total_length_m, 2.5);
    }

    #[test]
    fn test_no_edge_flag_zeroes_everything() {
        let mut row = piece("Panel [1111]", 1000.0, 500.0, 18.0, 1.0);
        row.no_edge = true;
        let mut warnings = Vec::new();
        compute_edges(&mut row, &catalog(), &EngineConfig::default(), &mut warnings);

        assert_eq!(row.edges.profile, "1111");
        assert_eq!(row.edges.total_cost, 0.0);
        assert!(row.edges.sides.iter().all(|s| s.cost == 0.0 && s.reference.is_none()));
    }

    #[test]
    fn test_catalog_miss_is_zero_cost_warning() {
        let mut row = piece("Panel [2000]", 1000.0, 500.0, 18.0, 1.0);
        row.edge_refs.thick = Some("GONE".to_string());
        let mut warnings = Vec::new();
        compute_edges(&mut row, &catalog(), &EngineConfig::default(), &mut warnings);

        assert_eq!(row.edges.sides[0].cost, 0.0);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].error, QuoteError::catalog_miss("GONE"));
    }

    #[test]
    fn test_missing_reference_warns() {
        let mut row = piece("Panel [1000]", 1000.0, 500.0, 18.0, 1.0);
        row.edge_refs.fine = None;
        let mut warnings = Vec::new();
        compute_edges(&mut row, &catalog(), &EngineConfig::default(), &mut warnings);

        assert_eq!(warnings[0].error, QuoteError::missing_field("edge_refs.fine"));
        assert_eq!(row.edges.total_cost, 0.0);
    }

    #[test]
    fn test_locked_row_keeps_edge_prices() {
        let mut row = piece("Shelf [1000]", 1000.0, 400.0, 18.0, 1.0);
        let mut warnings = Vec::new();
        compute_edges(&mut row, &catalog(), &EngineConfig::default(), &mut warnings);
        row.locked = true;

        let mut pricier = MemoryCatalog::new();
        pricier.insert("ORL-FINE", CatalogEntry::new(0.4, 80.0, 0.0));
        row.qt_total = 2.0;
        compute_edges(&mut row, &pricier, &EngineConfig::default(), &mut warnings);

        assert_eq!(row.edges.sides[0].price_per_area, 8.0);
        assert_eq!(row.edges.sides[0].cost, 0.41);
    }

    #[test]
    fn test_header_has_no_edges() {
        let mut row = Row::header().with_description("Base unit [1111]");
        let mut warnings = Vec::new();
        compute_edges(&mut row, &catalog(), &EngineConfig::default(), &mut warnings);
        assert_eq!(row.edges, EdgeBanding::default());
    }
}
