//! Cell records: persisted values, dependency edges and typed-input
//! classification.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::reference::CellId;

/// Persisted content of a cell.
///
/// `Formula` marks a cell whose text has not been evaluated yet. After a
/// recompute pass it is replaced by the cached `Number`, `String` or `Bool`
/// result; the source text stays in `Cell::formula`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    Formula(String),
    Number(#[serde(with = "lossless_f64")] f64),
    String(String),
    Bool(bool),
    /// Materialized explosive formula. Holds the status text shown in the
    /// cell; the formula itself lives in `Cell::formula`.
    ExplosiveFormula(String),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::String(String::new())
    }
}

impl CellValue {
    /// Text shown for this value.
    pub fn display(&self) -> String {
        match self {
            CellValue::Formula(_) => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::String(s) | CellValue::ExplosiveFormula(s) => s.clone(),
            CellValue::Bool(b) => bool_text(*b).to_string(),
        }
    }

    /// Formula text that reproduces this value as a literal.
    pub fn literal_formula(&self) -> String {
        match self {
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => bool_text(*b).to_string(),
            CellValue::String(s) | CellValue::ExplosiveFormula(s) => quote_literal(s),
            CellValue::Formula(_) => String::new(),
        }
    }
}

/// A grid cell: formula text, cached value, and its dependency edges.
///
/// `depend_in` holds the cells this formula reads; `depend_out` holds the
/// cells whose formulas read this one. Both sides of an edge are always
/// written together, see `Grid::set_dependencies`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Formula text without the leading `=`. Literals are stored as
    /// formulas too (`5`, `"text"`), so evaluating it always reproduces the
    /// value. Empty for a blank cell.
    pub formula: String,
    pub value: CellValue,
    #[serde(default)]
    pub depend_in: FxHashSet<CellId>,
    #[serde(default)]
    pub depend_out: FxHashSet<CellId>,
}

impl Cell {
    pub fn blank() -> Self {
        Self::default()
    }

    /// Cell waiting for its formula to be evaluated.
    pub fn with_formula(formula: impl Into<String>) -> Self {
        let formula = formula.into();
        Self {
            value: CellValue::Formula(formula.clone()),
            formula,
            ..Self::default()
        }
    }

    pub fn display(&self) -> String {
        self.value.display()
    }

    pub fn is_explosive(&self) -> bool {
        matches!(self.value, CellValue::ExplosiveFormula(_))
    }

    /// True when the formula holds no content once quotes are ignored.
    pub fn is_blank(&self) -> bool {
        self.formula.chars().all(|c| c == '"')
    }
}

/// What a piece of user input turns into before dependency wiring.
#[derive(Debug, Clone, PartialEq)]
pub enum CellInput {
    /// `=` followed by a formula that passed validation.
    Formula(String),
    /// `=` followed by a valid formula containing an explosive function.
    Explosive(String),
    /// `=` followed by text the validator rejected.
    Invalid(String),
    /// Anything else, already converted to literal formula text.
    Literal(String),
}

impl CellInput {
    /// Classify raw input the way a user typed it into a cell.
    pub fn classify(input: &str, language: &crate::formula::language::Language) -> Self {
        match input.strip_prefix('=') {
            Some(formula) if !crate::formula::validate::is_valid_formula(formula, language) => {
                CellInput::Invalid(formula.to_string())
            }
            Some(formula) if language.is_explosive(formula) => CellInput::Explosive(formula.to_string()),
            Some(formula) => CellInput::Formula(formula.to_string()),
            None => CellInput::Literal(literal_from_text(input)),
        }
    }

    /// Formula text that will be stored in the cell.
    pub fn formula_text(&self) -> String {
        match self {
            CellInput::Formula(f) | CellInput::Explosive(f) | CellInput::Literal(f) => f.clone(),
            CellInput::Invalid(f) => quote_literal(&format!("Error in formula: {f}")),
        }
    }
}

/// Literal formula for plain text input: numbers stay numeric, everything
/// else becomes a quoted string. Empty input stays empty.
pub fn literal_from_text(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else if is_number_literal(text) {
        text.to_string()
    } else {
        quote_literal(text)
    }
}

/// `-?[0-9]+(\.[0-9]+)?`
pub fn is_number_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let (int, frac) = match digits.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (digits, None),
    };
    !int.is_empty()
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

/// Wrap text in double quotes, escaping `\` and `"`.
pub fn quote_literal(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Shortest decimal text that round-trips, never in exponent form.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{n}")
    }
}

pub fn bool_text(b: bool) -> &'static str {
    if b { "TRUE" } else { "FALSE" }
}

/// JSON has no NaN or infinity, so those are written as their display text.
mod lossless_f64 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&super::format_number(*value))
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(t) => match t.as_str() {
                "NaN" => Ok(f64::NAN),
                "+Inf" => Ok(f64::INFINITY),
                "-Inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("not a number: {other}"))),
            },
        }
    }
}
