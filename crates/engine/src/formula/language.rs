//! Formula language tables.
//!
//! Operator spellings and precedence, the builtin function table, and the
//! characters that end a reference token. Built once per grid and passed by
//! reference to the lexer, validator, parser and evaluator.

use rustc_hash::FxHashMap;

use super::functions::{self, Builtin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Pow,
    Mul,
    Div,
    Add,
    Sub,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    /// `<>`
    Ne,
    /// `!=`
    NotEq,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le | BinaryOp::Eq | BinaryOp::Ne | BinaryOp::NotEq
        )
    }
}

/// Immutable description of the formula language.
#[derive(Debug, Clone)]
pub struct Language {
    /// Operator levels, tightest binding first. Operators on one level
    /// reduce left to right.
    levels: Vec<Vec<BinaryOp>>,
    /// Operator spellings, two-character ones first so `>=` wins over `>`.
    spellings: Vec<(&'static str, BinaryOp)>,
    functions: FxHashMap<&'static str, Builtin>,
    /// Function names whose evaluation writes neighbouring cells.
    explosive: Vec<&'static str>,
    /// Characters that terminate a reference or number token.
    break_chars: Vec<char>,
}

impl Language {
    /// The standard language: `^`, `* /`, `+ -`, comparisons.
    pub fn standard() -> Self {
        use BinaryOp::*;
        Self {
            levels: vec![
                vec![Pow],
                vec![Mul, Div],
                vec![Add, Sub],
                vec![Gt, Lt, Ge, Le, Eq, Ne, NotEq],
            ],
            spellings: vec![
                (">=", Ge),
                ("<=", Le),
                ("==", Eq),
                ("<>", Ne),
                ("!=", NotEq),
                ("^", Pow),
                ("*", Mul),
                ("/", Div),
                ("+", Add),
                ("-", Sub),
                (">", Gt),
                ("<", Lt),
            ],
            functions: functions::BUILTINS.iter().copied().collect(),
            explosive: vec!["OLS"],
            break_chars: vec![' ', ')', ',', '*', '/', '+', '-', '>', '<', '=', '^'],
        }
    }

    /// Number of precedence levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Precedence level of an operator (0 binds tightest).
    pub fn level_of(&self, op: BinaryOp) -> usize {
        self.levels
            .iter()
            .position(|level| level.contains(&op))
            .unwrap_or(self.levels.len())
    }

    /// Longest operator spelling at the start of `text`.
    pub fn match_operator(&self, text: &str) -> Option<(BinaryOp, usize)> {
        self.spellings
            .iter()
            .find(|(spelling, _)| text.starts_with(spelling))
            .map(|(spelling, op)| (*op, spelling.len()))
    }

    pub fn is_operator_char(&self, c: char) -> bool {
        self.spellings.iter().any(|(s, _)| s.starts_with(c))
    }

    pub fn is_break_char(&self, c: char) -> bool {
        self.break_chars.contains(&c)
    }

    pub fn function(&self, name: &str) -> Option<Builtin> {
        self.functions.get(name).copied()
    }

    pub fn is_explosive_function(&self, name: &str) -> bool {
        self.explosive.iter().any(|e| e.eq_ignore_ascii_case(name))
    }

    /// True if the formula text calls an explosive function anywhere.
    pub fn is_explosive(&self, formula: &str) -> bool {
        let upper = formula.to_ascii_uppercase();
        self.explosive.iter().any(|name| upper.contains(&format!("{name}(")))
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::standard()
    }
}
