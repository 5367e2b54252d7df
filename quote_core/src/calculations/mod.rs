//! # Row Calculations
//!
//! The per-row rules the recalculation engine runs, in the order it runs them:
//!
//! - [`module_context`] - header scopes, `HM/LM/PM` and the module multiplier
//! - [`dimensions`] - comp/larg/esp formulas, unit requirements, quantities
//! - [`edges`] - edge banding per side from the `[dddd]` profile code
//! - [`associations`] - associated-row detection, insertion and quantity rules
//! - [`costs`] - material, machine and finish costs, row totals
//! - [`pricing`] - item subtotals and sale price (consumes the engine output)
//!
//! Every rule mutates fields of rows that already exist. Only
//! [`associations::apply_insertions`] changes the sequence itself.
//! Problems are pushed as [`RecalcWarning`]s and never abort the run.

pub mod associations;
pub mod costs;
pub mod dimensions;
pub mod edges;
pub mod module_context;
pub mod pricing;

use serde::{Deserialize, Serialize};

use crate::errors::QuoteError;

pub use associations::{find_governing_row, QuantityRuleRegistry};
pub use module_context::{ModuleContext, ModuleTracker};
pub use pricing::{ItemTotals, Margins, PriceQuote};

/// A non-fatal problem found during recalculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalcWarning {
    /// Row id (1-based) the warning belongs to, if any
    pub row: Option<usize>,
    pub error: QuoteError,
}

impl RecalcWarning {
    pub fn for_row(row: usize, error: QuoteError) -> Self {
        RecalcWarning {
            row: Some(row),
            error,
        }
    }

    pub fn general(error: QuoteError) -> Self {
        RecalcWarning { row: None, error }
    }
}

impl std::fmt::Display for RecalcWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.row {
            Some(row) => write!(f, "row {}: {}", row, self.error),
            None => write!(f, "{}", self.error),
        }
    }
}
