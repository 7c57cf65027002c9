//! Reference extraction and replacement on formula text.
//!
//! Dependency wiring needs the set of cells a formula reads; copy, cut and
//! sort need to swap reference tokens for new text while leaving the rest
//! of the formula byte-for-byte intact. Both work on the lexer's token
//! stream, so string literals never produce false matches.

use std::ops::Range;

use rustc_hash::FxHashSet;

use super::eval::SheetDirectory;
use super::language::Language;
use super::lexer::{tokenize, TokenKind};
use crate::reference::{CellId, Reference, ReferenceRange, SheetIndex, UnboundRange, UnboundReference};

/// A reference token as written in a formula.
#[derive(Debug, Clone, PartialEq)]
pub enum RefToken {
    Cell(UnboundReference),
    Range(UnboundRange),
}

impl RefToken {
    /// Sheet name written in front of the token, if any.
    pub fn written_sheet(&self) -> Option<&str> {
        match self {
            RefToken::Cell(r) => r.sheet.as_deref(),
            RefToken::Range(r) => r.start.sheet.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoundRef {
    pub token: RefToken,
    pub span: Range<usize>,
}

/// Every reference and range token in `formula`, in text order.
///
/// Text that does not tokenize has no references.
pub fn scan(formula: &str, language: &Language) -> Vec<FoundRef> {
    let Ok(tokens) = tokenize(formula, language) else {
        return Vec::new();
    };
    tokens
        .into_iter()
        .filter_map(|token| {
            let found = match token.kind {
                TokenKind::Cell(r) => RefToken::Cell(r),
                TokenKind::Range(r) => RefToken::Range(r),
                _ => return None,
            };
            Some(FoundRef { token: found, span: token.span })
        })
        .collect()
}

/// Bind a written range to a sheet index.
pub fn bind_range<D: SheetDirectory + ?Sized>(
    range: &UnboundRange,
    home_sheet: SheetIndex,
    directory: &D,
) -> Option<ReferenceRange> {
    let sheet = match &range.start.sheet {
        None => home_sheet,
        Some(name) => directory.sheet_index(name)?,
    };
    Some(ReferenceRange::new(range.start.clone().bind(sheet), range.end.clone().bind(sheet)))
}

fn in_bounds<D: SheetDirectory + ?Sized>(reference: &Reference, directory: &D) -> bool {
    directory
        .sheet_bounds(reference.sheet)
        .is_some_and(|(rows, cols)| reference.row <= rows && reference.col <= cols)
}

/// Every cell `formula` reads when it lives on `home_sheet`, ranges
/// expanded.
///
/// Fails with the offending token text when a reference names an unknown
/// sheet or points outside its sheet.
pub fn referenced_cells<D: SheetDirectory + ?Sized>(
    formula: &str,
    home_sheet: SheetIndex,
    directory: &D,
    language: &Language,
) -> Result<FxHashSet<CellId>, String> {
    let mut cells = FxHashSet::default();
    for found in scan(formula, language) {
        let unresolved = || formula[found.span.clone()].to_string();
        match &found.token {
            RefToken::Cell(r) => {
                let bound = super::eval::bind_reference(r, home_sheet, directory)
                    .filter(|b| in_bounds(b, directory))
                    .ok_or_else(unresolved)?;
                cells.insert(bound.cell());
            }
            RefToken::Range(r) => {
                let bound = bind_range(r, home_sheet, directory)
                    .filter(|b| in_bounds(&b.start, directory) && in_bounds(&b.end, directory))
                    .ok_or_else(unresolved)?;
                cells.extend(bound.cells());
            }
        }
    }
    Ok(cells)
}

/// Replace reference tokens in `formula`.
///
/// `replace` returns new text for a token, or `None` to keep it as
/// written. Text that does not tokenize is returned unchanged.
pub fn rewrite(formula: &str, language: &Language, mut replace: impl FnMut(&RefToken) -> Option<String>) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;
    for found in scan(formula, language) {
        if let Some(text) = replace(&found.token) {
            out.push_str(&formula[last..found.span.start]);
            out.push_str(&text);
            last = found.span.end;
        }
    }
    out.push_str(&formula[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::eval::tests::MapLookup;

    fn directory() -> MapLookup {
        MapLookup::with(&[])
    }

    #[test]
    fn test_scan_skips_string_literals() {
        let language = Language::standard();
        let found = scan("A1 + \"B2\" + SUM(C1:C3)", &language);
        assert_eq!(found.len(), 2);
        assert!(matches!(&found[0].token, RefToken::Cell(r) if r.row == 1 && r.col == 1));
        assert!(matches!(&found[1].token, RefToken::Range(_)));
    }

    #[test]
    fn test_referenced_cells_expands_ranges() {
        let language = Language::standard();
        let cells = referenced_cells("A1+SUM(B1:B3)+Sheet2!C4", 0, &directory(), &language).unwrap();
        assert_eq!(cells.len(), 5);
        assert!(cells.contains(&CellId::new(0, 1, 1)));
        assert!(cells.contains(&CellId::new(0, 3, 2)));
        assert!(cells.contains(&CellId::new(1, 4, 3)));
    }

    #[test]
    fn test_referenced_cells_rejects_unresolvable() {
        let language = Language::standard();
        assert_eq!(
            referenced_cells("A1+Nope!A1", 0, &directory(), &language),
            Err("Nope!A1".to_string())
        );
        assert_eq!(
            referenced_cells("SUM(A1:A500)", 0, &directory(), &language),
            Err("A1:A500".to_string())
        );
        assert_eq!(referenced_cells("P1", 0, &directory(), &language), Err("P1".to_string()));
    }

    #[test]
    fn test_rewrite_keeps_other_text() {
        let language = Language::standard();
        let out = rewrite("A1 +  SUM( A1:B2 ) * \"A1\"", &language, |token| match token {
            RefToken::Cell(_) => Some("Z9".to_string()),
            RefToken::Range(_) => None,
        });
        assert_eq!(out, "Z9 +  SUM( A1:B2 ) * \"A1\"");
    }

    #[test]
    fn test_rewrite_invalid_text_unchanged() {
        let language = Language::standard();
        assert_eq!(rewrite("\"open", &language, |_| Some("X".into())), "\"open");
    }
}
