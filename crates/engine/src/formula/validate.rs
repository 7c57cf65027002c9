//! Formula validation.
//!
//! A formula is valid when it tokenizes and parses. Function names are not
//! checked here: an unknown function evaluates to `0`.

use super::language::Language;
use super::parser::{parse, ParseError};

/// Check formula text (without the leading `=`), reporting why it failed.
pub fn validate(formula: &str, language: &Language) -> Result<(), ParseError> {
    parse(formula, language).map(|_| ())
}

pub fn is_valid_formula(formula: &str, language: &Language) -> bool {
    validate(formula, language).is_ok()
}
