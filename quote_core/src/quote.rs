//! # Quote Data Structures
//!
//! The `Quote` struct is the root container for one cost breakdown.
//! Quotes serialize to `.quote.json` files as human-readable JSON.
//!
//! ## Structure
//!
//! ```text
//! Quote
//! ├── meta: QuoteMetadata (version, author, reference, client, timestamps)
//! ├── id: Uuid
//! ├── settings: EngineConfig (iteration cap, families, tariffs)
//! ├── globals: VariableMap (H, L, P, H1..P4)
//! ├── margins: Margins
//! ├── item_quantity: f64
//! └── rows: Vec<Row> (ordered breakdown)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use quote_core::quote::Quote;
//! use quote_core::row::{Row, Unit};
//!
//! let mut quote = Quote::new("Ana Estimator", "Q-26-014", "Kitchen Co");
//! quote.globals.set("H", "720");
//! quote.add_row(Row::principal("SIDE", Unit::M2).with_dimensions("H", "560", "18"));
//!
//! let json = serde_json::to_string_pretty(&quote).unwrap();
//! assert!(json.contains("Q-26-014"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calculations::pricing::{price, ItemTotals, Margins, PriceQuote};
use crate::catalog::{AssociationRules, Catalog};
use crate::config::EngineConfig;
use crate::engine::{RecalcEngine, RecalcReport};
use crate::errors::QuoteResult;
use crate::row::{renumber, Row};
use crate::variables::VariableMap;

/// Current schema version for quote files
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Root quote container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub meta: QuoteMetadata,

    pub id: Uuid,

    /// Engine settings used for this quote
    #[serde(default)]
    pub settings: EngineConfig,

    /// Global variables (`H`, `L`, `P`, `H1`..`P4`)
    #[serde(default)]
    pub globals: VariableMap,

    #[serde(default)]
    pub margins: Margins,

    /// Number of items the breakdown prices (the unit price divides by it)
    #[serde(default = "default_item_quantity")]
    pub item_quantity: f64,

    /// The breakdown, in order
    #[serde(default)]
    pub rows: Vec<Row>,
}

fn default_item_quantity() -> f64 {
    1.0
}

/// Result of [`Quote::recalculate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteOutcome {
    pub report: RecalcReport,
    pub price: PriceQuote,
}

impl Quote {
    /// Create an empty quote.
    ///
    /// ```rust
    /// use quote_core::quote::Quote;
    ///
    /// let quote = Quote::new("Ana", "Q-26-001", "Client");
    /// assert_eq!(quote.meta.author, "Ana");
    /// assert!(quote.rows.is_empty());
    /// ```
    pub fn new(author: impl Into<String>, reference: impl Into<String>, client: impl Into<String>) -> Self {
        let now = Utc::now();
        Quote {
            meta: QuoteMetadata {
                version: SCHEMA_VERSION.to_string(),
                author: author.into(),
                reference: reference.into(),
                client: client.into(),
                created: now,
                modified: now,
            },
            id: Uuid::new_v4(),
            settings: EngineConfig::default(),
            globals: VariableMap::new(),
            margins: Margins::default(),
            item_quantity: default_item_quantity(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Returns its 1-based id.
    pub fn add_row(&mut self, row: Row) -> usize {
        self.rows.push(row);
        renumber(&mut self.rows);
        self.touch();
        self.rows.len()
    }

    /// Remove the row with the given 1-based id.
    pub fn remove_row(&mut self, id: usize) -> Option<Row> {
        let index = id.checked_sub(1).filter(|i| *i < self.rows.len())?;
        let row = self.rows.remove(index);
        renumber(&mut self.rows);
        self.touch();
        Some(row)
    }

    pub fn row(&self, id: usize) -> Option<&Row> {
        id.checked_sub(1).and_then(|i| self.rows.get(i))
    }

    /// Update the modified timestamp.
    pub fn touch(&mut self) {
        self.meta.modified = Utc::now();
    }

    /// Recalculate the breakdown and price it.
    ///
    /// Settings are validated first; recalculation warnings are in the report.
    pub fn recalculate(&mut self, catalog: &dyn Catalog, rules: &dyn AssociationRules) -> QuoteResult<QuoteOutcome> {
        self.settings.validate()?;
        let engine = RecalcEngine::new(catalog, rules).with_config(self.settings.clone());
        let report = engine.recalculate(&mut self.rows, &self.globals);
        let totals = ItemTotals::from_rows(&self.rows);
        let price = price(&totals, &self.margins, self.item_quantity)?;
        self.touch();
        Ok(QuoteOutcome { report, price })
    }
}

impl Default for Quote {
    fn default() -> Self {
        Quote::new("", "", "")
    }
}

/// Quote metadata stored in the file header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteMetadata {
    /// Schema version (for migration compatibility)
    pub version: String,

    /// Who prepared the quote
    pub author: String,

    /// Quote reference number
    pub reference: String,

    pub client: String,

    pub created: DateTime<Utc>,

    pub modified: DateTime<Utc>,
}
