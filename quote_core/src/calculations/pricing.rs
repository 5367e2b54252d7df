//! # Pricing Rollup
//!
//! Sums the row totals of a recalculated breakdown into four subtotals and
//! applies percentage margins:
//!
//! ```text
//! sale  = Σ subtotal × (1 + (category margin + general margin) / 100)
//! unit  = sale / item quantity
//! ```
//!
//! Labor is the machine-operation total.
//!
//! ## Example
//!
//! ```rust
//! use quote_core::calculations::pricing::{price, ItemTotals, Margins};
//!
//! let totals = ItemTotals { material: 100.0, edge: 10.0, labor: 40.0, finish: 0.0 };
//! let margins = Margins { material: 20.0, general: 5.0, ..Default::default() };
//!
//! let quote = price(&totals, &margins, 2.0).unwrap();
//! // 125.00 + 10.50 + 42.00
//! assert_eq!(quote.sale_total, 177.5);
//! assert_eq!(quote.unit_price, 88.75);
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{QuoteError, QuoteResult};
use crate::row::Row;
use crate::units::round2;

/// Item subtotals per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemTotals {
    pub material: f64,
    pub edge: f64,
    pub labor: f64,
    pub finish: f64,
}

impl ItemTotals {
    /// Roll up the cost totals of every non-header row.
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut totals = rows
            .iter()
            .filter(|row| !row.is_header())
            .fold(ItemTotals::default(), |acc, row| ItemTotals {
                material: acc.material + row.costs.material_total,
                edge: acc.edge + row.costs.edge_total,
                labor: acc.labor + row.costs.machine_total,
                finish: acc.finish + row.costs.finish_total,
            });
        totals.material = round2(totals.material);
        totals.edge = round2(totals.edge);
        totals.labor = round2(totals.labor);
        totals.finish = round2(totals.finish);
        totals
    }

    pub fn total(&self) -> f64 {
        round2(self.material + self.edge + self.labor + self.finish)
    }
}

/// Margins in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub material: f64,
    pub edge: f64,
    pub labor: f64,
    pub finish: f64,
    /// Added on top of every category margin
    pub general: f64,
}

/// Priced item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub totals: ItemTotals,
    pub cost_total: f64,
    pub sale_total: f64,
    pub item_quantity: f64,
    pub unit_price: f64,
}

fn with_margin(subtotal: f64, category: f64, general: f64) -> f64 {
    subtotal * (1.0 + (category + general) / 100.0)
}

/// Apply margins to the subtotals and divide by the item quantity.
pub fn price(totals: &ItemTotals, margins: &Margins, item_quantity: f64) -> QuoteResult<PriceQuote> {
    if !(item_quantity.is_finite() && item_quantity > 0.0) {
        return Err(QuoteError::invalid_input(
            "item_quantity",
            item_quantity.to_string(),
            "Item quantity must be positive",
        ));
    }

    let sale_total = round2(
        with_margin(totals.material, margins.material, margins.general)
            + with_margin(totals.edge, margins.edge, margins.general)
            + with_margin(totals.labor, margins.labor, margins.general)
            + with_margin(totals.finish, margins.finish, margins.general),
    );

    Ok(PriceQuote {
        totals: *totals,
        cost_total: totals.total(),
        sale_total,
        item_quantity,
        unit_price: round2(sale_total / item_quantity),
    })
}
