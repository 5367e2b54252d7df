//! # Breakdown Rows
//!
//! A quote's cost breakdown is an ordered `Vec<Row>`. Three kinds of rows
//! share the same record:
//!
//! ```text
//! MODULE  H=720 L=600 P=560  x2        <- Header: defines HM/LM/PM and a multiplier
//!   SIDE  comp=HM larg=PM              <- Principal
//!   SHELF comp=LM-36 larg=PM-20        <- Principal
//!     SUPPORT (associated)             <- Associated: inserted by a rule
//! MODULE  ...                          <- next Header closes the previous scope
//! ```
//!
//! The kind is not stored: a row is a header when its definition code is
//! [`HEADER_CODE`], associated when it carries the associated marker, and a
//! principal otherwise. Associated rows find their principal by position
//! (see [`crate::calculations::associations::find_governing_row`]).
//!
//! ## Example
//!
//! ```rust
//! use quote_core::row::{Row, RowKind, Unit};
//!
//! let header = Row::header().with_dimensions("H1", "L", "P").with_qt_mod("2");
//! let side = Row::principal("SIDE", Unit::M2).with_dimensions("HM", "PM", "18");
//!
//! assert_eq!(header.kind(), RowKind::Header);
//! assert_eq!(side.kind(), RowKind::Principal);
//! ```

use serde::{Deserialize, Serialize};

use crate::units::Millimeters;

/// Definition code that marks a row as a module header.
pub const HEADER_CODE: &str = "MODULE";

/// Maximum number of associated components a principal row can carry.
pub const MAX_ASSOCIATED: usize = 3;

/// Unit a row is quantified in. Drives which dimensions are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Unit {
    /// Per unit (hardware, accessories)
    #[default]
    #[serde(rename = "UND")]
    Und,
    /// Per linear metre
    #[serde(rename = "ML")]
    Ml,
    /// Per square metre
    #[serde(rename = "M2")]
    M2,
}

impl Unit {
    /// Short code shown in the breakdown
    pub fn code(&self) -> &'static str {
        match self {
            Unit::Und => "UND",
            Unit::Ml => "ML",
            Unit::M2 => "M2",
        }
    }

    pub fn requires_comp(&self) -> bool {
        matches!(self, Unit::Ml | Unit::M2)
    }

    pub fn requires_larg(&self) -> bool {
        matches!(self, Unit::M2)
    }

    /// UND rows never carry resolved dimensions.
    pub fn resolves_dimensions(&self) -> bool {
        !matches!(self, Unit::Und)
    }
}

/// Behavioural kind of a row (derived, see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowKind {
    Header,
    Principal,
    Associated,
}

/// A formula-resolved value with its error marker and derivation trail.
///
/// `value == None` with `error == false` means "not specified";
/// `error == true` means the formula was present but invalid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolved {
    pub value: Option<f64>,
    pub error: bool,
    pub trail: String,
}

impl Resolved {
    pub fn ok(value: f64, trail: impl Into<String>) -> Self {
        Resolved {
            value: Some(value),
            error: false,
            trail: trail.into(),
        }
    }

    pub fn failed(trail: impl Into<String>) -> Self {
        Resolved {
            value: None,
            error: true,
            trail: trail.into(),
        }
    }

    pub fn empty() -> Self {
        Resolved::default()
    }

    /// Resolved value or zero, for cost rules that treat "absent" as nothing.
    pub fn or_zero(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

/// Link between a row and its catalog material, plus the prices pulled from it.
///
/// On unlocked rows the engine refreshes the catalog-sourced fields
/// (`price_table`, `waste_fraction`, `thickness_mm`, `family`) every pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialLink {
    pub material_ref: Option<String>,
    /// Catalog price per unit of measure, before row discounts
    pub price_table: f64,
    /// Price after `discount_plus` / `discount_minus`
    pub price_net: f64,
    /// Markup fraction added on top of the catalog price
    pub discount_plus: f64,
    /// Discount fraction taken off the catalog price
    pub discount_minus: f64,
    pub waste_fraction: f64,
    pub thickness_mm: Option<f64>,
    /// Material family (e.g. "MDF"), used to gate finishes
    pub family: Option<String>,
    /// Material supplied by the customer or a third party
    pub supplied_by_others: bool,
}

/// Edge banding references chosen by the profile digits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeProfileRefs {
    /// Used where the profile digit is `1`
    pub fine: Option<String>,
    /// Used where the profile digit is any other non-zero value
    pub thick: Option<String>,
}

/// One associated component a principal carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedSlot {
    pub code: String,
    pub quantity_rule: String,
}

/// Base values for the eight machine/operation categories.
///
/// Each category only applies when its value is at least 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationInputs {
    /// Cutting rate per metre of perimeter
    pub cut_rate: f64,
    /// Edge-banding machine rate per metre of banded edge
    pub edge_machine_rate: f64,
    /// Handling flag; the tariff comes from the piece area bucket
    pub handling: f64,
    /// Flat rate per piece
    pub flat_rate: f64,
    /// Minutes on the panel saw per piece
    pub panel_saw_minutes: f64,
    /// Minutes on the CNC per piece
    pub cnc_minutes: f64,
    /// Minutes of assembly per piece
    pub assembly_minutes: f64,
    /// Rate per cubic metre of piece volume
    pub volume_rate: f64,
}

/// One optional finish face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinishSelection {
    pub enabled: bool,
    pub reference: Option<String>,
    pub price_net: f64,
    pub waste_fraction: f64,
}

/// Top and bottom finish faces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Finishes {
    pub top: FinishSelection,
    pub bottom: FinishSelection,
}

/// Resolved banding for one side of a piece.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSide {
    pub reference: Option<String>,
    pub thickness_mm: f64,
    pub price_per_area: f64,
    pub waste_fraction: f64,
    pub running_length_m: f64,
    pub cost: f64,
    pub trail: String,
}

/// Edge banding for the four sides: sides 1-2 run along `comp`, 3-4 along `larg`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeBanding {
    pub profile: String,
    pub sides: [EdgeSide; 4],
    pub total_length_m: f64,
    pub total_cost: f64,
}

/// Per-piece cost of each machine/operation category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineCosts {
    pub cut: f64,
    pub edge_machine: f64,
    pub handling: f64,
    pub flat: f64,
    pub panel_saw: f64,
    pub cnc: f64,
    pub assembly: f64,
    pub volume: f64,
}

impl MachineCosts {
    pub fn sum(&self) -> f64 {
        self.cut
            + self.edge_machine
            + self.handling
            + self.flat
            + self.panel_saw
            + self.cnc
            + self.assembly
            + self.volume
    }
}

/// Cost outputs of a row. `*_unit` is per piece, `*_total` is × `qt_total`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowCosts {
    pub material_unit: f64,
    pub material_total: f64,
    pub machine: MachineCosts,
    pub machine_unit: f64,
    pub machine_total: f64,
    pub finish_top_unit: f64,
    pub finish_bottom_unit: f64,
    pub finish_unit: f64,
    pub finish_total: f64,
    pub edge_total: f64,
    pub total: f64,
}

/// One line of the cost breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Row {
    /// 1-based position, reassigned after every insertion
    pub id: usize,
    pub definition_code: String,
    pub description: String,

    pub qt_mod_formula: String,
    pub comp_formula: String,
    pub larg_formula: String,
    pub esp_formula: String,

    /// Pieces per item (user-edited, or derived for associated rows)
    pub qt_und: f64,
    pub qt_mod: Resolved,
    pub comp: Resolved,
    pub larg: Resolved,
    pub esp: Resolved,
    pub qt_total: f64,

    pub unit: Unit,
    pub material: MaterialLink,
    pub edge_refs: EdgeProfileRefs,
    /// Zeroes all four edge sides regardless of profile
    pub no_edge: bool,

    pub locked: bool,

    /// Marker carried by rows inserted by an association rule
    pub associated_marker: bool,
    /// Associated components of a principal (at most [`MAX_ASSOCIATED`])
    pub associated: Vec<AssociatedSlot>,
    /// Rule deriving `qt_und` of an associated row
    pub quantity_rule: Option<String>,

    pub operations: OperationInputs,
    pub finishes: Finishes,
    pub skip_machine_costs: bool,

    pub edges: EdgeBanding,
    pub costs: RowCosts,
}

impl Row {
    /// A module header row.
    pub fn header() -> Self {
        Row {
            definition_code: HEADER_CODE.to_string(),
            qt_und: 1.0,
            ..Default::default()
        }
    }

    /// A principal row for `definition_code`.
    pub fn principal(definition_code: impl Into<String>, unit: Unit) -> Self {
        Row {
            definition_code: definition_code.into(),
            unit,
            qt_und: 1.0,
            ..Default::default()
        }
    }

    /// An associated row derived by `quantity_rule`.
    pub fn associated(definition_code: impl Into<String>, quantity_rule: impl Into<String>, unit: Unit) -> Self {
        Row {
            definition_code: definition_code.into(),
            unit,
            qt_und: 1.0,
            associated_marker: true,
            quantity_rule: Some(quantity_rule.into()),
            ..Default::default()
        }
    }

    /// Set the comp/larg/esp formulas.
    pub fn with_dimensions(mut self, comp: &str, larg: &str, esp: &str) -> Self {
        self.comp_formula = comp.to_string();
        self.larg_formula = larg.to_string();
        self.esp_formula = esp.to_string();
        self
    }

    pub fn with_qt_mod(mut self, formula: &str) -> Self {
        self.qt_mod_formula = formula.to_string();
        self
    }

    pub fn with_qt_und(mut self, qt_und: f64) -> Self {
        self.qt_und = qt_und;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_material(mut self, reference: impl Into<String>) -> Self {
        self.material.material_ref = Some(reference.into());
        self
    }

    pub fn with_edges(mut self, fine: Option<&str>, thick: Option<&str>) -> Self {
        self.edge_refs.fine = fine.map(str::to_string);
        self.edge_refs.thick = thick.map(str::to_string);
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn kind(&self) -> RowKind {
        if self.definition_code == HEADER_CODE {
            RowKind::Header
        } else if self.associated_marker {
            RowKind::Associated
        } else {
            RowKind::Principal
        }
    }

    pub fn is_header(&self) -> bool {
        self.kind() == RowKind::Header
    }

    pub fn is_principal(&self) -> bool {
        self.kind() == RowKind::Principal
    }

    pub fn is_associated(&self) -> bool {
        self.kind() == RowKind::Associated
    }

    pub fn comp_mm(&self) -> Millimeters {
        Millimeters(self.comp.or_zero())
    }

    pub fn larg_mm(&self) -> Millimeters {
        Millimeters(self.larg.or_zero())
    }

    /// Piece thickness: resolved `esp`, else the material's catalog thickness.
    pub fn thickness_mm(&self) -> Millimeters {
        Millimeters(
            self.esp
                .value
                .or(self.material.thickness_mm)
                .unwrap_or(0.0),
        )
    }

    /// Whether any formula cell on this row is flagged invalid.
    pub fn has_errors(&self) -> bool {
        self.qt_mod.error || self.comp.error || self.larg.error || self.esp.error
    }
}

/// Reassign 1-based ids after the sequence changed.
pub fn renumber(rows: &mut [Row]) {
    for (index, row) in rows.iter_mut().enumerate() {
        row.id = index + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_derived() {
        assert_eq!(Row::header().kind(), RowKind::Header);
        assert_eq!(Row::principal("SHELF", Unit::M2).kind(), RowKind::Principal);
        assert_eq!(
            Row::associated("SUPPORT", "double_sibling", Unit::Und).kind(),
            RowKind::Associated
        );
    }

    #[test]
    fn test_unit_requirements() {
        assert!(!Unit::Und.requires_comp());
        assert!(Unit::Ml.requires_comp());
        assert!(!Unit::Ml.requires_larg());
        assert!(Unit::M2.requires_comp() && Unit::M2.requires_larg());
        assert!(!Unit::Und.resolves_dimensions());
    }

    #[test]
    fn test_unit_serialization() {
        assert_eq!(serde_json::to_string(&Unit::M2).unwrap(), "\"M2\"");
        let unit: Unit = serde_json::from_str("\"ML\"").unwrap();
        assert_eq!(unit, Unit::Ml);
    }

    #[test]
    fn test_row_from_sparse_json() {
        let json = r#"{ "definition_code": "SIDE", "unit": "M2", "comp_formula": "HM" }"#;
        let row: Row = serde_json::from_str(json).unwrap();
        assert_eq!(row.kind(), RowKind::Principal);
        assert_eq!(row.comp_formula, "HM");
        assert!(row.comp.value.is_none());
    }

    #[test]
    fn test_thickness_falls_back_to_material() {
        let mut row = Row::principal("SIDE", Unit::M2);
        row.material.thickness_mm = Some(19.0);
        assert_eq!(row.thickness_mm().0, 19.0);
        row.esp = Resolved::ok(25.0, "25");
        assert_eq!(row.thickness_mm().0, 25.0);
    }

    #[test]
    fn test_renumber() {
        let mut rows = vec![Row::header(), Row::principal("A", Unit::Und), Row::principal("B", Unit::Und)];
        renumber(&mut rows);
        let ids: Vec<usize> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
