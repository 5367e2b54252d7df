//! # Formula Evaluator
//!
//! Dimension and quantity cells hold small arithmetic formulas written over a
//! fixed variable set (`H`, `L1`, `HM`, ...). Evaluation runs in three steps:
//!
//! ```text
//! "H/2-50"  --substitute-->  "(2000)/2-50"  --normalise-->  lexer/parser  -->  950.0
//! ```
//!
//! 1. Every whole-word identifier is replaced by its value, searching the
//!    variable layers in order (module-local before global).
//! 2. Decimal commas become dots; `x`, `X`, `×` and `·` become `*`.
//! 3. The result must use only numbers, `+ - * /`, parentheses and whitespace.
//!
//! A blank formula is "not specified" and evaluates to `Ok(None)`, which
//! callers keep distinct from an explicit zero.
//!
//! ## Example
//!
//! ```rust
//! use quote_core::formula::evaluate;
//! use quote_core::variables::VariableMap;
//!
//! let globals = VariableMap::from_pairs([("H", "2000")]);
//! assert_eq!(evaluate("H/2-50", &[&globals]).unwrap(), Some(950.0));
//! assert_eq!(evaluate("   ", &[&globals]).unwrap(), None);
//! ```

pub mod lexer;
pub mod parser;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::variables::VariableMap;
use parser::Parser;

/// Why a formula could not be evaluated.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvalError {
    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("variable '{name}' has a non-numeric value '{value}'")]
    InvalidVariableValue { name: String, value: String },

    #[error("character '{ch}' is not allowed in a formula")]
    InvalidCharacter { ch: char },

    #[error("malformed number '{literal}'")]
    InvalidNumber { literal: String },

    #[error("unexpected '{found}'")]
    UnexpectedToken { found: String },

    #[error("formula ends unexpectedly")]
    UnexpectedEnd,

    #[error("unbalanced parentheses")]
    UnbalancedParentheses,

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,
}

/// Evaluate `formula` against variable layers searched front to back.
///
/// Returns `Ok(None)` for a blank formula.
pub fn evaluate(formula: &str, layers: &[&VariableMap]) -> Result<Option<f64>, EvalError> {
    if formula.trim().is_empty() {
        return Ok(None);
    }
    let substituted = substitute(formula, layers)?;
    let normalised = normalize(&substituted);
    Parser::new(&normalised)?.evaluate().map(Some)
}

/// Replace whole-word variables with their parenthesised values.
///
/// An `x` directly followed by digits (as in `2x3`) is a multiplication
/// glyph, not an identifier.
pub fn substitute(formula: &str, layers: &[&VariableMap]) -> Result<String, EvalError> {
    let identifier = regex!(r"[A-Za-z_\p{L}][A-Za-z0-9_\p{L}]*");

    let mut out = String::with_capacity(formula.len() + 8);
    let mut last = 0;
    for found in identifier.find_iter(formula) {
        out.push_str(&formula[last..found.start()]);
        last = found.end();

        let word = found.as_str();
        if let Some(rest) = multiplication_glyph(word) {
            out.push('*');
            out.push_str(rest);
            continue;
        }

        let name = word.to_ascii_uppercase();
        let value = layers
            .iter()
            .find_map(|layer| layer.get(&name))
            .ok_or_else(|| EvalError::UnknownVariable { name: name.clone() })?;

        let numeric = normalize(value.trim());
        if numeric.parse::<f64>().is_err() {
            return Err(EvalError::InvalidVariableValue {
                name,
                value: value.to_string(),
            });
        }
        out.push('(');
        out.push_str(&numeric);
        out.push(')');
    }
    out.push_str(&formula[last..]);
    Ok(out)
}

/// `x`, `X`, `x3`, `X12` are multiplication glyphs; returns the digits after the glyph.
fn multiplication_glyph(word: &str) -> Option<&str> {
    let rest = word.strip_prefix('x').or_else(|| word.strip_prefix('X'))?;
    rest.chars().all(|c| c.is_ascii_digit()).then_some(rest)
}

/// Normalise decimal commas and multiplication glyphs.
pub fn normalize(expression: &str) -> String {
    expression
        .chars()
        .map(|c| match c {
            ',' => '.',
            '×' | '·' | 'x' | 'X' => '*',
            other => other,
        })
        .collect()
}
