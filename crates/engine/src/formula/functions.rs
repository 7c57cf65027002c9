//! Built-in spreadsheet functions

use super::eval::{RangeTerm, Term};

/// A builtin receives its arguments already evaluated. Range arguments
/// arrive as `Term::Range`.
pub type Builtin = fn(args: &[Term]) -> Term;

/// Every builtin, keyed by upper-case name. `OLS` is not listed: explosive
/// functions are handled by the evaluator itself.
pub const BUILTINS: &[(&str, Builtin)] = &[
    ("SUM", sum),
    ("AVERAGE", average),
    ("COUNT", count),
    ("IF", if_fn),
    ("MATHC", math_constant),
    ("SQRT", sqrt),
    ("NUMBER", number),
    ("FLOOR", floor),
    ("CEIL", ceil),
    ("ABS", abs),
    ("LEN", len),
    ("CONCATENATE", concatenate),
    ("CONCAT", concatenate),
    ("RAND", rand_fn),
    ("VLOOKUP", vlookup),
];

/// Arguments with ranges expanded into their members.
fn flatten(args: &[Term]) -> impl Iterator<Item = &Term> {
    args.iter().flat_map(|arg| match arg {
        Term::Range(range) => range.values.iter().collect::<Vec<_>>(),
        other => vec![other],
    })
}

fn sum(args: &[Term]) -> Term {
    Term::Number(flatten(args).map(Term::to_number).sum())
}

fn average(args: &[Term]) -> Term {
    let total: f64 = args
        .iter()
        .map(|arg| match arg {
            Term::Range(range) => {
                let members: f64 = range.values.iter().map(Term::to_number).sum();
                members / range.values.len() as f64
            }
            other => other.to_number(),
        })
        .sum();
    Term::Number(total / args.len() as f64)
}

fn count(args: &[Term]) -> Term {
    let n = flatten(args).filter(|term| !term.to_text().is_empty()).count();
    Term::Number(n as f64)
}

fn if_fn(args: &[Term]) -> Term {
    match args {
        [condition, then, otherwise] => {
            if condition.to_bool() {
                then.clone()
            } else {
                otherwise.clone()
            }
        }
        _ => Term::text("IF requires 3 params"),
    }
}

fn math_constant(args: &[Term]) -> Term {
    let [name] = args else {
        return Term::text("MATH.C only takes one argument");
    };
    let name = name.to_text();
    match name.as_str() {
        "e" | "E" => Term::Number(std::f64::consts::E),
        "π" | "pi" | "PI" | "Pi" => Term::Number(std::f64::consts::PI),
        _ => Term::text(format!("constant requested not found: {name}")),
    }
}

fn sqrt(args: &[Term]) -> Term {
    match args {
        [x] => Term::Number(x.to_number().sqrt()),
        _ => Term::text("SQRT only takes one argument"),
    }
}

/// Shared shape of the one-argument numeric builtins.
fn unary(name: &str, args: &[Term], f: impl Fn(f64) -> f64) -> Term {
    match args {
        [x] => Term::Number(f(x.to_number())),
        _ => Term::text(format!("{name} only supports one argument")),
    }
}

fn number(args: &[Term]) -> Term {
    unary("NUMBER", args, |x| x)
}

fn floor(args: &[Term]) -> Term {
    unary("FLOOR", args, f64::floor)
}

fn ceil(args: &[Term]) -> Term {
    unary("CEIL", args, f64::ceil)
}

fn abs(args: &[Term]) -> Term {
    unary("ABS", args, f64::abs)
}

fn len(args: &[Term]) -> Term {
    match args {
        [x] => Term::Number(x.to_text().chars().count() as f64),
        _ => Term::text("LEN only supports one argument"),
    }
}

fn concatenate(args: &[Term]) -> Term {
    Term::Text(flatten(args).map(Term::to_text).collect())
}

fn rand_fn(_args: &[Term]) -> Term {
    Term::Number(rand::random::<f64>())
}

/// VLOOKUP(value, range, column): match `value` against the first column
/// of `range` by text, return the member of the matching row in `column`.
fn vlookup(args: &[Term]) -> Term {
    let [needle, Term::Range(table), column] = args else {
        return if args.len() == 3 {
            Term::text("VLOOKUP requires a range as second argument")
        } else {
            Term::text("VLOOKUP only supports 3 arguments")
        };
    };

    let column = column.to_number();
    if column < 1.0 || column as usize > table.width {
        return Term::text(format!("VLOOKUP column {} outside range", column));
    }
    let column = column as usize - 1;

    lookup_row(table, &needle.to_text())
        .and_then(|row| table.get(row, column))
        .cloned()
        .unwrap_or_else(|| Term::text("#NOTFOUND"))
}

fn lookup_row(table: &RangeTerm, needle: &str) -> Option<usize> {
    table.column(0).iter().position(|term| term.to_text() == needle)
}
