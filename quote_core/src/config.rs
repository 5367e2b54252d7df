//! # Engine Settings
//!
//! Settings the recalculation engine reads but never writes: the iteration
//! cap, waste defaults, material-family gates and the workshop tariffs used
//! by the machine cost categories. Stored in the `settings` block of a quote
//! file, or loaded on their own with [`EngineConfig::from_json`].
//!
//! ## JSON Example
//!
//! ```json
//! {
//!   "max_iterations": 10,
//!   "default_edge_waste": 0.10,
//!   "finish_family": "MDF",
//!   "finish_only_family": "LAC",
//!   "tariffs": {
//!     "handling_small": 0.8,
//!     "handling_medium": 1.2,
//!     "handling_large": 1.8,
//!     "panel_saw_hourly": 42.0,
//!     "cnc_hourly": 65.0,
//!     "assembly_hourly": 28.0
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{QuoteError, QuoteResult};

/// Default bound on expansion iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Edge waste used when the catalog gives none (10 %).
pub const DEFAULT_EDGE_WASTE: f64 = 0.10;

/// Settings for one recalculation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum orchestrator iterations before giving up on a fixpoint
    pub max_iterations: u32,

    /// Waste fraction for edges whose catalog entry has none
    pub default_edge_waste: f64,

    /// Finishes are only priced on rows of this material family
    pub finish_family: String,

    /// M2 rows of this family are priced through finishes, not material
    pub finish_only_family: Option<String>,

    /// Workshop tariffs
    pub tariffs: MachineTariffs,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            default_edge_waste: DEFAULT_EDGE_WASTE,
            finish_family: "MDF".to_string(),
            finish_only_family: None,
            tariffs: MachineTariffs::default(),
        }
    }
}

impl EngineConfig {
    /// Parse settings from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> QuoteResult<Self> {
        let config: EngineConfig = serde_json::from_str(json).map_err(|e| QuoteError::SerializationError {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate settings.
    pub fn validate(&self) -> QuoteResult<()> {
        if self.max_iterations == 0 {
            return Err(QuoteError::invalid_input(
                "max_iterations",
                "0",
                "At least one iteration is required",
            ));
        }
        if !(0.0..1.0).contains(&self.default_edge_waste) {
            return Err(QuoteError::invalid_input(
                "default_edge_waste",
                self.default_edge_waste.to_string(),
                "Waste must be a fraction between 0 and 1",
            ));
        }
        self.tariffs.validate()
    }
}

/// Workshop tariffs for the machine cost categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineTariffs {
    /// Handling per piece up to 0.7 m²
    pub handling_small: f64,
    /// Handling per piece below 1.0 m²
    pub handling_medium: f64,
    /// Handling per piece from 1.0 m²
    pub handling_large: f64,
    /// Panel saw, per hour
    pub panel_saw_hourly: f64,
    /// CNC machining centre, per hour
    pub cnc_hourly: f64,
    /// Assembly bench, per hour
    pub assembly_hourly: f64,
}

impl Default for MachineTariffs {
    fn default() -> Self {
        MachineTariffs {
            handling_small: 0.80,
            handling_medium: 1.20,
            handling_large: 1.80,
            panel_saw_hourly: 42.0,
            cnc_hourly: 65.0,
            assembly_hourly: 28.0,
        }
    }
}

impl MachineTariffs {
    fn validate(&self) -> QuoteResult<()> {
        let fields = [
            ("handling_small", self.handling_small),
            ("handling_medium", self.handling_medium),
            ("handling_large", self.handling_large),
            ("panel_saw_hourly", self.panel_saw_hourly),
            ("cnc_hourly", self.cnc_hourly),
            ("assembly_hourly", self.assembly_hourly),
        ];
        for (field, value) in fields {
            if value < 0.0 || !value.is_finite() {
                return Err(QuoteError::invalid_input(
                    field,
                    value.to_string(),
                    "Tariffs must be non-negative",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.default_edge_waste, 0.10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{ "max_iterations": 4, "tariffs": { "cnc_hourly": 90.0 } }"#).unwrap();
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.tariffs.cnc_hourly, 90.0);
        assert_eq!(config.tariffs.panel_saw_hourly, 42.0);
        assert_eq!(config.finish_family, "MDF");
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let err = EngineConfig::from_json(r#"{ "max_iterations": 0 }"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_rejects_negative_tariff() {
        let err = EngineConfig::from_json(r#"{ "tariffs": { "cnc_hourly": -1.0 } }"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_malformed_json() {
        let err = EngineConfig::from_json("{ not json").unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }
}
