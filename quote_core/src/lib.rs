//! # quote_core - Carpentry Cost Breakdown Engine
//!
//! `quote_core` recalculates a furniture quote: an ordered breakdown of rows
//! (module headers, pieces and their hardware) whose dimensions are formulas
//! over a small set of named variables. One call resolves every formula,
//! inserts the associated components pieces require, prices material,
//! machine time, finishes and edge banding, and rolls the costs up into a
//! sale price.
//!
//! ## Design Philosophy
//!
//! - **Never aborts**: a bad formula or missing catalog entry flags its row
//!   and the rest of the breakdown still prices
//! - **JSON-First**: quotes, catalogs and rules are plain serde types
//! - **Rich Errors**: structured error types, not strings
//! - **Pluggable collaborators**: catalogs and association rules are traits
//!
//! ## Quick Start
//!
//! ```rust
//! use quote_core::catalog::{AssociationTable, CatalogEntry, MemoryCatalog};
//! use quote_core::quote::Quote;
//! use quote_core::row::{Row, Unit};
//!
//! let mut catalog = MemoryCatalog::new();
//! catalog.insert("AGL18", CatalogEntry::new(18.0, 12.0, 0.0));
//!
//! let mut quote = Quote::new("Ana Estimator", "Q-26-014", "Kitchen Co");
//! quote.globals.set("H", "2000");
//! quote.add_row(
//!     Row::principal("SIDE", Unit::M2)
//!         .with_dimensions("H/2-50", "500", "18")
//!         .with_material("AGL18"),
//! );
//!
//! let outcome = quote.recalculate(&catalog, &AssociationTable::new()).unwrap();
//! assert_eq!(quote.rows[0].comp.value, Some(950.0));
//! // 0.95 × 0.5 m² × 12.00
//! assert_eq!(outcome.price.totals.material, 5.7);
//! ```
//!
//! ## Modules
//!
//! - [`quote`] - Quote container, metadata and margins
//! - [`engine`] - The recalculation orchestrator
//! - [`calculations`] - Per-row rules (modules, dimensions, edges, costs, associations, pricing)
//! - [`formula`] - Arithmetic formula evaluation with variable substitution
//! - [`row`] - The breakdown row and its typed fields
//! - [`catalog`] - Catalog and association rule collaborators
//! - [`config`] - Engine settings and workshop tariffs
//! - [`units`] - Type-safe unit wrappers
//! - [`errors`] - Structured error types
//! - [`file_io`] - File operations with atomic saves and locking

#[macro_use]
mod macros;

pub mod calculations;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod file_io;
pub mod formula;
pub mod quote;
pub mod row;
pub mod units;
pub mod variables;

pub use catalog::{AssociationRules, Catalog};
pub use config::EngineConfig;
pub use engine::{RecalcEngine, RecalcReport, RecalcStatus};
pub use errors::{QuoteError, QuoteResult};
pub use file_io::{load_quote, save_quote, FileLock};
pub use quote::{Quote, QuoteMetadata};
pub use row::{Row, Unit};
