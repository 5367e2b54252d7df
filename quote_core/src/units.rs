//! # Unit Types
//!
//! Type-safe wrappers for the measures a cost breakdown works in. Rows store
//! dimensions in millimetres; every cost rule works in metres, square metres
//! or cubic metres. The newtypes keep those conversions explicit.
//!
//! ## Example
//!
//! ```rust
//! use quote_core::units::{Meters, Millimeters, SquareMeters};
//!
//! let comp: Meters = Millimeters(2400.0).into();
//! assert_eq!(comp.0, 2.4);
//!
//! let area = SquareMeters::of_rectangle(Millimeters(2400.0), Millimeters(600.0));
//! assert!((area.0 - 1.44).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul};

// ============================================================================
// Length Units
// ============================================================================

/// Length in millimetres (the unit rows are entered in)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millimeters(pub f64);

/// Length in metres
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Meters(pub f64);

impl From<Millimeters> for Meters {
    fn from(mm: Millimeters) -> Self {
        Meters(mm.0 / 1000.0)
    }
}

impl From<Meters> for Millimeters {
    fn from(m: Meters) -> Self {
        Millimeters(m.0 * 1000.0)
    }
}

// ============================================================================
// Area and Volume
// ============================================================================

/// Area in square metres
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SquareMeters(pub f64);

impl SquareMeters {
    /// Area of a `comp × larg` rectangle given in millimetres
    pub fn of_rectangle(comp: Millimeters, larg: Millimeters) -> Self {
        SquareMeters(Meters::from(comp).0 * Meters::from(larg).0)
    }
}

/// Volume in cubic metres
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CubicMeters(pub f64);

impl CubicMeters {
    /// Volume of a `comp × larg × esp` block given in millimetres
    pub fn of_block(comp: Millimeters, larg: Millimeters, esp: Millimeters) -> Self {
        CubicMeters(SquareMeters::of_rectangle(comp, larg).0 * Meters::from(esp).0)
    }
}

// ============================================================================
// Arithmetic Implementations (macro to reduce boilerplate)
// ============================================================================

macro_rules! impl_arithmetic {
    ($type:ty) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl $type {
            /// Get the raw f64 value
            pub fn value(self) -> f64 {
                self.0
            }
        }
    };
}

impl_arithmetic!(Millimeters);
impl_arithmetic!(Meters);
impl_arithmetic!(SquareMeters);
impl_arithmetic!(CubicMeters);

// ============================================================================
// Rounding
// ============================================================================

/// Round to 2 decimals, the precision of every displayed cell.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to 3 decimals (running lengths in metres).
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
