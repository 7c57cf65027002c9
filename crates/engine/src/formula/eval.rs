//! Formula evaluator - parses formula text and reduces it against the grid.
//! Formulas are re-parsed on every evaluation; nothing is cached here.

use std::cmp::Ordering;

use log::trace;

use super::language::{BinaryOp, Language};
use super::ols::{self, Explosion};
use super::parser::{parse, Expr};
use super::refs::bind_range;
use crate::cell::{bool_text, format_number, CellValue};
use crate::reference::{CellId, Reference, ReferenceRange, SheetIndex, UnboundRange, UnboundReference};

/// Sheet name and size lookup used to resolve written references.
pub trait SheetDirectory {
    fn sheet_index(&self, name: &str) -> Option<SheetIndex>;
    fn sheet_name(&self, sheet: SheetIndex) -> Option<&str>;
    /// (rows, cols) of a sheet.
    fn sheet_bounds(&self, sheet: SheetIndex) -> Option<(usize, usize)>;
}

/// Read access to already computed cell values.
pub trait CellLookup: SheetDirectory {
    /// Current value of a cell. Missing cells read as the empty string.
    fn term(&self, cell: CellId) -> Term;
}

/// Intermediate evaluation value. Never stored in a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Number(f64),
    Text(String),
    Bool(bool),
    Range(RangeTerm),
}

/// Values of a range, column by column.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTerm {
    pub height: usize,
    pub width: usize,
    pub values: Vec<Term>,
}

impl RangeTerm {
    /// Member at 0-based (row, col) inside the range.
    pub fn get(&self, row: usize, col: usize) -> Option<&Term> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.values.get(col * self.height + row)
    }

    /// 0-based column of the range.
    pub fn column(&self, col: usize) -> &[Term] {
        let start = (col * self.height).min(self.values.len());
        let end = (start + self.height).min(self.values.len());
        &self.values[start..end]
    }
}

impl Term {
    pub fn text(s: impl Into<String>) -> Self {
        Term::Text(s.into())
    }

    /// Numeric view: booleans are 1/0, numeric text parses, anything else is 0.
    pub fn to_number(&self) -> f64 {
        match self {
            Term::Number(n) => *n,
            Term::Bool(b) => f64::from(u8::from(*b)),
            Term::Text(s) => s.trim().parse().unwrap_or(0.0),
            Term::Range(_) => 0.0,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Term::Number(n) => format_number(*n),
            Term::Text(s) => s.clone(),
            Term::Bool(b) => bool_text(*b).to_string(),
            Term::Range(_) => "#VALUE!".to_string(),
        }
    }

    /// Truthiness: non-zero numbers and non-empty text are true.
    pub fn to_bool(&self) -> bool {
        match self {
            Term::Bool(b) => *b,
            Term::Number(n) => *n != 0.0,
            Term::Text(s) => !s.is_empty(),
            Term::Range(_) => false,
        }
    }

    /// Cross-type ordering used by comparison operators.
    ///
    /// Text sorts above numbers. Pairs with no defined order (a boolean
    /// against a number, anything against a range) return `None`, which the
    /// operators treat as neither greater nor smaller.
    pub fn compare(&self, other: &Term) -> Option<Ordering> {
        match (self, other) {
            (Term::Text(a), Term::Text(b)) => Some(a.cmp(b)),
            (Term::Text(_), Term::Number(_)) => Some(Ordering::Greater),
            (Term::Number(_), Term::Text(_)) => Some(Ordering::Less),
            (Term::Number(a), Term::Number(b)) => a.partial_cmp(b),
            (Term::Bool(a), Term::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order for sorting: numbers, then text, then booleans.
    pub fn sort_cmp(&self, other: &Term) -> Ordering {
        fn rank(term: &Term) -> u8 {
            match term {
                Term::Number(_) => 0,
                Term::Text(_) => 1,
                Term::Bool(_) => 2,
                Term::Range(_) => 3,
            }
        }
        match (self, other) {
            (Term::Number(a), Term::Number(b)) => a.total_cmp(b),
            (Term::Text(a), Term::Text(b)) => a.cmp(b),
            (Term::Bool(a), Term::Bool(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }

    pub fn from_cell_value(value: &CellValue) -> Term {
        match value {
            CellValue::Number(n) => Term::Number(*n),
            CellValue::Bool(b) => Term::Bool(*b),
            CellValue::String(s) | CellValue::ExplosiveFormula(s) => Term::Text(s.clone()),
            CellValue::Formula(_) => Term::Text(String::new()),
        }
    }

    /// Value to cache in a cell. A range cannot be stored in one cell.
    pub fn into_cell_value(self) -> CellValue {
        match self {
            Term::Number(n) => CellValue::Number(n),
            Term::Text(s) => CellValue::String(s),
            Term::Bool(b) => CellValue::Bool(b),
            Term::Range(_) => CellValue::String("#VALUE!".to_string()),
        }
    }
}

/// Evaluates formulas on behalf of one cell.
///
/// Explosive functions do not write to the grid directly: the cells they
/// produce are collected and handed back through `into_explosions`.
pub struct Evaluator<'a, L: CellLookup + ?Sized> {
    lookup: &'a L,
    language: &'a Language,
    origin: CellId,
    explosions: Vec<Explosion>,
}

impl<'a, L: CellLookup + ?Sized> Evaluator<'a, L> {
    pub fn new(lookup: &'a L, language: &'a Language, origin: CellId) -> Self {
        Self { lookup, language, origin, explosions: Vec::new() }
    }

    /// Evaluate formula text (without `=`).
    pub fn evaluate(&mut self, formula: &str) -> Term {
        let expr = match parse(formula, self.language) {
            Ok(expr) => expr,
            Err(err) => {
                trace!("{} does not parse: {err}", self.origin);
                return Term::text(format!("Error in formula: {formula}"));
            }
        };
        match self.eval(&expr) {
            Term::Range(_) => Term::text("#VALUE!"),
            term => term,
        }
    }

    pub fn into_explosions(self) -> Vec<Explosion> {
        self.explosions
    }

    fn eval(&mut self, expr: &Expr) -> Term {
        match expr {
            Expr::Empty => Term::text(""),
            Expr::Number(n) => Term::Number(*n),
            Expr::Text(s) => Term::Text(s.clone()),
            Expr::Bool(b) => Term::Bool(*b),
            Expr::Cell(reference) => match self.resolve_cell(reference) {
                Some(cell) => self.lookup.term(cell),
                None => Term::text(format!("#REF: {reference}")),
            },
            Expr::Range(range) => match self.resolve_range(range) {
                Some(bound) => Term::Range(RangeTerm {
                    height: bound.height(),
                    width: bound.width(),
                    values: bound.cells().map(|cell| self.lookup.term(cell)).collect(),
                }),
                None => Term::text(format!("#REF: {range}")),
            },
            Expr::Call { name, args } => {
                let args: Vec<Term> = args.iter().map(|arg| self.eval(arg)).collect();
                if self.language.is_explosive_function(name) {
                    return self.explode(&args);
                }
                match self.language.function(name) {
                    Some(function) => function(&args),
                    None => Term::Number(0.0),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left);
                let right = self.eval(right);
                apply_binary(*op, &left, &right)
            }
        }
    }

    fn explode(&mut self, args: &[Term]) -> Term {
        let regression = match ols::regress(args) {
            Ok(regression) => regression,
            Err(message) => return Term::Text(message),
        };
        let bounds = self
            .lookup
            .sheet_bounds(self.origin.sheet)
            .unwrap_or((self.origin.row, self.origin.col));
        self.explosions.extend(ols::explosion_cells(self.origin, &regression, bounds));
        Term::text(regression.status())
    }

    fn resolve_cell(&self, reference: &UnboundReference) -> Option<CellId> {
        bind_reference(reference, self.origin.sheet, self.lookup).map(|bound| bound.cell())
    }

    fn resolve_range(&self, range: &UnboundRange) -> Option<ReferenceRange> {
        bind_range(range, self.origin.sheet, self.lookup)
    }
}

fn apply_binary(op: BinaryOp, left: &Term, right: &Term) -> Term {
    if op.is_comparison() {
        let order = left.compare(right);
        let greater = order == Some(Ordering::Greater);
        let smaller = order == Some(Ordering::Less);
        let result = match op {
            BinaryOp::Gt => greater,
            BinaryOp::Lt => smaller,
            BinaryOp::Ge => !smaller,
            BinaryOp::Le => !greater,
            BinaryOp::Eq => !smaller && !greater,
            _ => smaller || greater,
        };
        return Term::Bool(result);
    }

    let (a, b) = (left.to_number(), right.to_number());
    Term::Number(match op {
        BinaryOp::Pow => a.powf(b),
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Add => a + b,
        _ => a - b,
    })
}

/// Evaluate formula text for the cell at `origin`.
pub fn evaluate<L: CellLookup + ?Sized>(formula: &str, origin: CellId, lookup: &L, language: &Language) -> Term {
    Evaluator::new(lookup, language, origin).evaluate(formula)
}

/// Bind a reference written in a formula on `origin_sheet`.
pub fn bind_reference<D: SheetDirectory + ?Sized>(
    reference: &UnboundReference,
    origin_sheet: SheetIndex,
    directory: &D,
) -> Option<Reference> {
    let sheet = match &reference.sheet {
        None => origin_sheet,
        Some(name) => directory.sheet_index(name)?,
    };
    Some(reference.clone().bind(sheet))
}
