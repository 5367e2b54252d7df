//! # Error Types
//!
//! Structured error types for quote_core. Most of these never abort a
//! recalculation: the engine records them as warnings against the row that
//! produced them and keeps computing the rest of the breakdown.
//!
//! ## Example
//!
//! ```rust
//! use quote_core::errors::{QuoteError, QuoteResult};
//!
//! fn validate_margin(margin: f64) -> QuoteResult<()> {
//!     if margin < 0.0 {
//!         return Err(QuoteError::InvalidInput {
//!             field: "margin".to_string(),
//!             value: margin.to_string(),
//!             reason: "Margin cannot be negative".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::formula::EvalError;

/// Result type alias for quote_core operations
pub type QuoteResult<T> = Result<T, QuoteError>;

/// Structured error type for quote operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum QuoteError {
    /// A formula cell could not be evaluated
    #[error("Formula error in '{field}' ({formula}): {source}")]
    Evaluation {
        field: String,
        formula: String,
        source: EvalError,
    },

    /// A field the row's unit requires is empty
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Catalog reference not found (priced as zero)
    #[error("Catalog reference not found: {reference}")]
    CatalogMiss { reference: String },

    /// No association rule for a definition code (never inserts rows)
    #[error("No association rule for '{definition_code}'")]
    RuleMiss { definition_code: String },

    /// An associated row names a quantity rule that is not registered
    #[error("Unknown quantity rule: {rule}")]
    UnknownQuantityRule { rule: String },

    /// Associated-row expansion did not reach a fixpoint
    #[error("Expansion did not stabilise after {iterations} iterations")]
    IterationCapExceeded { iterations: u32 },

    /// An input value is invalid (out of range, wrong name, etc.)
    #[error("Invalid input for '{field}': {value} - {reason}")]
    InvalidInput {
        field: String,
        value: String,
        reason: String,
    },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// File is locked by another user/process
    #[error("File locked: '{path}' is locked by {locked_by} since {locked_at}")]
    FileLocked {
        path: String,
        locked_by: String,
        locked_at: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// Schema version mismatch
    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: String,
        expected_version: String,
    },
}

impl QuoteError {
    /// Create an Evaluation error
    pub fn evaluation(field: impl Into<String>, formula: impl Into<String>, source: EvalError) -> Self {
        QuoteError::Evaluation {
            field: field.into(),
            formula: formula.into(),
            source,
        }
    }

    /// Create a MissingField error
    pub fn missing_field(field: impl Into<String>) -> Self {
        QuoteError::MissingField {
            field: field.into(),
        }
    }

    /// Create a CatalogMiss error
    pub fn catalog_miss(reference: impl Into<String>) -> Self {
        QuoteError::CatalogMiss {
            reference: reference.into(),
        }
    }

    /// Create a RuleMiss error
    pub fn rule_miss(definition_code: impl Into<String>) -> Self {
        QuoteError::RuleMiss {
            definition_code: definition_code.into(),
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        QuoteError::InvalidInput {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(operation: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        QuoteError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileLocked error
    pub fn file_locked(path: impl Into<String>, locked_by: impl Into<String>, locked_at: impl Into<String>) -> Self {
        QuoteError::FileLocked {
            path: path.into(),
            locked_by: locked_by.into(),
            locked_at: locked_at.into(),
        }
    }

    /// Check if this is a recoverable error (e.g., can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, QuoteError::FileLocked { .. })
    }

    /// Whether this error only degrades a single row and the run carries on.
    pub fn is_row_local(&self) -> bool {
        matches!(
            self,
            QuoteError::Evaluation { .. }
                | QuoteError::MissingField { .. }
                | QuoteError::CatalogMiss { .. }
                | QuoteError::RuleMiss { .. }
                | QuoteError::UnknownQuantityRule { .. }
        )
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            QuoteError::Evaluation { .. } => "EVALUATION_ERROR",
            QuoteError::MissingField { .. } => "MISSING_FIELD",
            QuoteError::CatalogMiss { .. } => "CATALOG_MISS",
            QuoteError::RuleMiss { .. } => "RULE_MISS",
            QuoteError::UnknownQuantityRule { .. } => "UNKNOWN_QUANTITY_RULE",
            QuoteError::IterationCapExceeded { .. } => "ITERATION_CAP_EXCEEDED",
            QuoteError::InvalidInput { .. } => "INVALID_INPUT",
            QuoteError::FileError { .. } => "FILE_ERROR",
            QuoteError::FileLocked { .. } => "FILE_LOCKED",
            QuoteError::SerializationError { .. } => "SERIALIZATION_ERROR",
            QuoteError::VersionMismatch { .. } => "VERSION_MISMATCH",
        }
    }
}
