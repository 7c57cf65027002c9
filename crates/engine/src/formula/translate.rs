//! Formula rewriting for copy, cut and sort.
//!
//! # Copy
//!
//! Every reference moves by the distance between source and destination
//! cell, except on `$`-pinned axes, and is clamped into its sheet. A
//! reference to the formula's own sheet follows the formula to the
//! destination sheet; references to other sheets keep their sheet.
//!
//! # Cut
//!
//! A moved formula keeps its meaning: its own references stay where they
//! are. What changes is everyone pointing *at* a moved cell. Those
//! references are retargeted to the new location (see `retarget_formula`),
//! and a range is only shifted when the whole range lies inside the moved
//! block.

use rustc_hash::FxHashMap;

use super::eval::{bind_reference, SheetDirectory};
use super::language::Language;
use super::refs::{bind_range, rewrite, RefToken};
use crate::reference::{apply_delta, delta, CellId, Reference, ReferenceRange, SheetIndex, UnboundReference};

/// Rewrite `formula` for a move from `source` to `destination`.
///
/// With `is_cut` the references keep pointing at the same cells; a
/// reference to the source sheet gains an explicit sheet prefix when the
/// formula lands on another sheet. Otherwise this is a copy.
///
/// Tokens whose rewrite would produce the same reference keep their
/// original text, so a zero-distance copy returns `formula` unchanged.
pub fn translate_formula<D: SheetDirectory + ?Sized>(
    formula: &str,
    source: CellId,
    destination: CellId,
    is_cut: bool,
    directory: &D,
    language: &Language,
) -> String {
    let (row_delta, col_delta) = if is_cut { (0, 0) } else { delta(destination, source) };

    rewrite(formula, language, |token| match token {
        RefToken::Cell(written) => {
            let bound = bind_reference(written, source.sheet, directory)?;
            let target_sheet = follow_sheet(bound.sheet, source.sheet, destination.sheet, is_cut);
            let shifted = shift(&bound, row_delta, col_delta, true, target_sheet, directory)?;
            render_cell(written, &shifted, destination.sheet, directory)
        }
        RefToken::Range(written) => {
            let bound = bind_range(written, source.sheet, directory)?;
            let target_sheet = follow_sheet(bound.sheet(), source.sheet, destination.sheet, is_cut);
            let start = shift(&bound.start, row_delta, col_delta, true, target_sheet, directory)?;
            let end = shift(&bound.end, row_delta, col_delta, true, target_sheet, directory)?;
            render_range(&written.start, &written.end, &ReferenceRange::new(start, end), destination.sheet, directory)
        }
    })
}

/// Sheet a reference lands on after the move.
fn follow_sheet(sheet: SheetIndex, source: SheetIndex, destination: SheetIndex, is_cut: bool) -> SheetIndex {
    if !is_cut && sheet == source {
        destination
    } else {
        sheet
    }
}

/// Shift coordinates, moving onto `target_sheet` and clamping into it.
fn shift<D: SheetDirectory + ?Sized>(
    reference: &Reference,
    row_delta: i64,
    col_delta: i64,
    honor_fixed: bool,
    target_sheet: SheetIndex,
    directory: &D,
) -> Option<Reference> {
    let bounds = directory.sheet_bounds(target_sheet)?;
    let (shifted, _) = apply_delta(reference, row_delta, col_delta, honor_fixed, bounds);
    Some(shifted.bind(target_sheet))
}

/// Sheet name to write in front of a reference to `sheet` from a formula on
/// `home`. Unqualified references stay unqualified while they still point
/// at the formula's own sheet.
fn written_sheet<D: SheetDirectory + ?Sized>(
    was_qualified: bool,
    sheet: SheetIndex,
    home: SheetIndex,
    directory: &D,
) -> Option<Option<String>> {
    if !was_qualified && sheet == home {
        return Some(None);
    }
    directory.sheet_name(sheet).map(|name| Some(name.to_string()))
}

/// New text for a cell reference, `None` when nothing changed.
fn render_cell<D: SheetDirectory + ?Sized>(
    written: &UnboundReference,
    new: &Reference,
    home: SheetIndex,
    directory: &D,
) -> Option<String> {
    let sheet = written_sheet(written.sheet.is_some(), new.sheet, home, directory)?;
    let rendered = new.bind(sheet);
    (rendered != *written).then(|| rendered.to_string())
}

/// New text for a range, `None` when nothing changed.
fn render_range<D: SheetDirectory + ?Sized>(
    written_start: &UnboundReference,
    written_end: &UnboundReference,
    new: &ReferenceRange,
    home: SheetIndex,
    directory: &D,
) -> Option<String> {
    let sheet = written_sheet(written_start.sheet.is_some(), new.sheet(), home, directory)?;
    let start = new.start.bind(sheet.clone());
    let end = new.end.bind(sheet);
    if start == *written_start && end == *written_end {
        return None;
    }
    Some(ReferenceRange { start, end }.to_string())
}

/// A cut in progress: which cells moved where, and the block they left.
#[derive(Debug, Clone)]
pub struct CutMove {
    pub moved: FxHashMap<CellId, CellId>,
    pub source: ReferenceRange,
    pub destination_sheet: SheetIndex,
    pub row_delta: i64,
    pub col_delta: i64,
}

/// Rewrite a formula affected by a cut.
///
/// `home` is where the formula lived before the cut, `new_home` where it
/// lives after (the same cell unless the formula itself moved). References
/// to moved cells follow them; ranges follow only when both corners lie in
/// the source block. Everything else keeps pointing where it did, gaining a
/// sheet prefix if the formula changed sheets.
pub fn retarget_formula<D: SheetDirectory + ?Sized>(
    formula: &str,
    home: SheetIndex,
    new_home: SheetIndex,
    cut: &CutMove,
    directory: &D,
    language: &Language,
) -> String {
    rewrite(formula, language, |token| match token {
        RefToken::Cell(written) => {
            let bound = bind_reference(written, home, directory)?;
            let target = match cut.moved.get(&bound.cell()) {
                Some(to) => Reference { sheet: to.sheet, row: to.row, col: to.col, ..bound },
                None => bound,
            };
            render_cell(written, &target, new_home, directory)
        }
        RefToken::Range(written) => {
            let bound = bind_range(written, home, directory)?;
            let inside = cut.source.contains(bound.start.cell()) && cut.source.contains(bound.end.cell());
            let target = if inside {
                let start = shift(&bound.start, cut.row_delta, cut.col_delta, false, cut.destination_sheet, directory)?;
                let end = shift(&bound.end, cut.row_delta, cut.col_delta, false, cut.destination_sheet, directory)?;
                ReferenceRange::new(start, end)
            } else {
                bound
            };
            render_range(&written.start, &written.end, &target, new_home, directory)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::eval::tests::MapLookup;
    use proptest::prelude::*;

    fn dir() -> MapLookup {
        MapLookup::with(&[])
    }

    fn copy(formula: &str, from: (usize, usize, usize), to: (usize, usize, usize)) -> String {
        translate_formula(
            formula,
            CellId::new(from.0, from.1, from.2),
            CellId::new(to.0, to.1, to.2),
            false,
            &dir(),
            &Language::standard(),
        )
    }

    #[test]
    fn test_copy_shifts_relative_axes() {
        assert_eq!(copy("A1*2", (0, 2, 1), (0, 2, 2)), "B1*2");
        assert_eq!(copy("A1+$A$1+A$1+$A1", (0, 1, 1), (0, 3, 2)), "B3+$A$1+B$1+$A3");
        assert_eq!(copy("SUM(A1:B2)", (0, 1, 3), (0, 2, 3)), "SUM(A2:B3)");
    }

    #[test]
    fn test_copy_clamps_into_sheet() {
        assert_eq!(copy("A2", (0, 5, 1), (0, 1, 1)), "A1");
        assert_eq!(copy("O1", (0, 1, 1), (0, 1, 5)), "O1");
    }

    #[test]
    fn test_copy_across_sheets() {
        // Own-sheet references follow, other-sheet references keep their sheet.
        assert_eq!(copy("A1+Sheet2!B1", (0, 2, 1), (1, 3, 1)), "A2+Sheet2!B2");
        assert_eq!(copy("Sheet1!A1", (0, 2, 1), (1, 2, 1)), "Sheet2!A1");
    }

    #[test]
    fn test_copy_keeps_unrelated_text() {
        assert_eq!(copy("A1 + \"A1\"", (0, 1, 1), (0, 2, 1)), "A2 + \"A1\"");
        assert_eq!(copy("\"x\" + A1", (0, 1, 1), (0, 2, 1)), "\"x\" + A2");
    }

    #[test]
    fn test_cut_keeps_meaning() {
        let language = Language::standard();
        let d = dir();
        let same_sheet = translate_formula("A1*2", CellId::new(0, 2, 1), CellId::new(0, 2, 2), true, &d, &language);
        assert_eq!(same_sheet, "A1*2");

        let other_sheet = translate_formula("A1*2", CellId::new(0, 2, 1), CellId::new(1, 2, 1), true, &d, &language);
        assert_eq!(other_sheet, "Sheet1!A1*2");
    }

    #[test]
    fn test_retarget_follower() {
        let language = Language::standard();
        let mut moved = FxHashMap::default();
        moved.insert(CellId::new(0, 2, 1), CellId::new(0, 2, 2));
        let cut = CutMove {
            moved,
            source: ReferenceRange::single(CellId::new(0, 2, 1)),
            destination_sheet: 0,
            row_delta: 0,
            col_delta: 1,
        };
        assert_eq!(retarget_formula("A2", 0, 0, &cut, &dir(), &language), "B2");
        assert_eq!(retarget_formula("$A$2+A1", 0, 0, &cut, &dir(), &language), "$B$2+A1");
        // Range only partially inside the cut block stays.
        assert_eq!(retarget_formula("SUM(A1:A2)", 0, 0, &cut, &dir(), &language), "SUM(A1:A2)");
        // Range fully inside the block moves.
        assert_eq!(retarget_formula("SUM(A2:A2)", 0, 0, &cut, &dir(), &language), "SUM(B2:B2)");
    }

    #[test]
    fn test_retarget_moved_formula_across_sheets() {
        let language = Language::standard();
        let mut moved = FxHashMap::default();
        moved.insert(CellId::new(0, 1, 1), CellId::new(1, 1, 1));
        let cut = CutMove {
            moved,
            source: ReferenceRange::single(CellId::new(0, 1, 1)),
            destination_sheet: 1,
            row_delta: 0,
            col_delta: 0,
        };
        // The formula moved to Sheet2 and still reads Sheet1!C3.
        assert_eq!(retarget_formula("C3", 0, 1, &cut, &dir(), &language), "Sheet1!C3");
    }

    proptest! {
        #[test]
        fn prop_zero_delta_copy_is_identity(
            row in 1usize..=100,
            col in 1usize..=15,
            a in 1usize..=100,
            b in 1usize..=15,
            fixed in any::<(bool, bool)>(),
        ) {
            let reference = Reference { fixed_row: fixed.0, fixed_col: fixed.1, ..Reference::new(0, a, b) };
            let formula = format!("{}+SUM({}:B2)*Sheet2!A1 - \"x\"", reference.a1(), reference.a1());
            let at = CellId::new(0, row, col);
            let out = translate_formula(&formula, at, at, false, &dir(), &Language::standard());
            prop_assert_eq!(out, formula);
        }
    }
}
