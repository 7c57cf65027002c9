//! Dependency edges between cells.
//!
//! Edges live on the cells themselves: `depend_in` is what a formula reads,
//! `depend_out` is who reads this cell. All edge changes go through
//! `Grid::set_dependencies`, which rewires both sides in one step.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B reads A"  (A ∈ B.depend_in, B ∈ A.depend_out)
//! ```
//!
//! Marking a cell dirty follows outgoing edges, so "what must recompute if
//! X changes" is the closure over `depend_out`.
//!
//! # Invariants
//!
//! 1. **Mutual edges:** if A ∈ B.depend_in then B ∈ A.depend_out, and vice versa.
//! 2. **No scan:** rewiring a cell touches only the cell and its old and new
//!    precedents, never the whole grid.
//! 3. **Inert explosions:** an explosive formula cell has no `depend_in`.

use log::{trace, warn};
use rustc_hash::FxHashSet;

use crate::cell::{quote_literal, Cell, CellValue};
use crate::formula::eval::Evaluator;
use crate::formula::refs::referenced_cells;
use crate::grid::Grid;
use crate::reference::CellId;

impl Grid {
    /// Store `cell` at `id` and rewire its incoming edges from its formula.
    ///
    /// The stored cell's `depend_out` is kept: whoever read this position
    /// still reads it. Then `id` and everything downstream of it is marked
    /// dirty. Calling this twice with the same formula leaves the same edges.
    ///
    /// A reference to an unknown sheet or outside its sheet replaces the
    /// formula with the literal `"#REF: <ref>"`.
    pub fn set_dependencies(&mut self, id: CellId, mut cell: Cell) {
        let precedents = if cell.is_explosive() {
            FxHashSet::default()
        } else {
            match referenced_cells(&cell.formula, id.sheet, &*self, self.language()) {
                Ok(precedents) => precedents,
                Err(token) => {
                    warn!("{id}: unresolvable reference {token} in {:?}", cell.formula);
                    let literal = quote_literal(&format!("#REF: {token}"));
                    cell.value = CellValue::Formula(literal.clone());
                    cell.formula = literal;
                    FxHashSet::default()
                }
            }
        };

        // Step 1: unlink from the old precedents
        let previous = self.cell_or_blank(id);
        for old in &previous.depend_in {
            if let Some(source) = self.cell_mut(*old) {
                source.depend_out.remove(&id);
            }
        }

        // Step 2: store the cell, keeping its readers
        cell.depend_in = precedents.clone();
        cell.depend_out = previous.depend_out;
        self.insert_cell(id, cell);

        // Step 3: link to the new precedents (a self-reference lands on the
        // cell just stored)
        for source in precedents {
            match self.cell_mut(source) {
                Some(existing) => {
                    existing.depend_out.insert(id);
                }
                None => {
                    let mut blank = Cell::blank();
                    blank.depend_out.insert(id);
                    self.insert_cell(source, blank);
                }
            }
        }

        self.mark_dirty(id);
    }

    /// Mark `id` and every cell that transitively reads it as dirty.
    pub fn mark_dirty(&mut self, id: CellId) {
        let mut visited = FxHashSet::default();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            self.dirty.insert(current);
            if let Some(cell) = self.cell(current) {
                stack.extend(cell.depend_out.iter().copied());
            }
        }
    }

    /// Evaluate an explosive formula once and write its output block.
    ///
    /// The formula cell gets the status text as its value and no incoming
    /// edges. Each output cell becomes a plain literal, wired like any other
    /// literal write, so it is re-read by whatever already followed it.
    /// Returns the output cells.
    pub fn assign_explosive(&mut self, id: CellId, formula: &str) -> Vec<CellId> {
        let language = self.language_handle();
        let mut evaluator = Evaluator::new(&*self, &language, id);
        let status = evaluator.evaluate(formula).to_text();
        let explosions = evaluator.into_explosions();
        trace!("{id}: explosive formula wrote {} cells", explosions.len());

        let mut cell = Cell::with_formula(formula);
        cell.value = CellValue::ExplosiveFormula(status);
        self.set_dependencies(id, cell);

        explosions
            .into_iter()
            .filter(|explosion| explosion.cell != id)
            .map(|explosion| {
                let literal = explosion.value.literal_formula();
                self.set_dependencies(explosion.cell, Cell::with_formula(literal));
                explosion.cell
            })
            .collect()
    }

    /// Check edge invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (id, cell) in self.cells() {
            for source in &cell.depend_in {
                assert!(
                    self.cell(*source).is_some_and(|c| c.depend_out.contains(&id)),
                    "Missing out edge: {source} should list {id} as a reader"
                );
            }
            for reader in &cell.depend_out {
                assert!(
                    self.cell(*reader).is_some_and(|c| c.depend_in.contains(&id)),
                    "Missing in edge: {reader} should list {id} as a precedent"
                );
            }
            if cell.is_explosive() {
                assert!(cell.depend_in.is_empty(), "Explosive cell {id} has precedents");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::cell;
    use proptest::prelude::*;

    fn set(cells: &[CellId]) -> FxHashSet<CellId> {
        cells.iter().copied().collect()
    }

    fn write(grid: &mut Grid, a1: &str, formula: &str) {
        grid.set_dependencies(cell(0, a1), Cell::with_formula(formula));
    }

    #[test]
    fn test_single_edge() {
        let mut grid = Grid::default();
        write(&mut grid, "B1", "A1*2");

        assert_eq!(grid.cell(cell(0, "B1")).unwrap().depend_in, set(&[cell(0, "A1")]));
        assert_eq!(grid.cell(cell(0, "A1")).unwrap().depend_out, set(&[cell(0, "B1")]));
        assert!(grid.is_dirty(cell(0, "B1")));
        grid.assert_consistent();
    }

    #[test]
    fn test_range_expands_to_members() {
        let mut grid = Grid::default();
        write(&mut grid, "C1", "SUM(A1:B2)+Sheet2!A1");
        let precedents = &grid.cell(cell(0, "C1")).unwrap().depend_in;
        assert_eq!(precedents.len(), 5);
        assert!(precedents.contains(&cell(1, "A1")));
        grid.assert_consistent();
    }

    #[test]
    fn test_rewiring_unlinks_old_precedents() {
        let mut grid = Grid::default();
        write(&mut grid, "C1", "A1+B1");
        write(&mut grid, "C1", "B1");

        assert!(grid.cell(cell(0, "A1")).unwrap().depend_out.is_empty());
        assert_eq!(grid.cell(cell(0, "B1")).unwrap().depend_out, set(&[cell(0, "C1")]));
        grid.assert_consistent();
    }

    #[test]
    fn test_readers_survive_rewrite() {
        let mut grid = Grid::default();
        write(&mut grid, "B1", "A1");
        write(&mut grid, "A1", "7");
        assert_eq!(grid.cell(cell(0, "A1")).unwrap().depend_out, set(&[cell(0, "B1")]));
        grid.assert_consistent();
    }

    #[test]
    fn test_dirty_marking_follows_readers() {
        let mut grid = Grid::default();
        write(&mut grid, "B1", "A1");
        write(&mut grid, "C1", "B1");
        write(&mut grid, "D1", "5");
        grid.dirty.clear();

        write(&mut grid, "A1", "1");
        assert_eq!(grid.dirty_cells(), &set(&[cell(0, "A1"), cell(0, "B1"), cell(0, "C1")]));
    }

    #[test]
    fn test_self_reference() {
        let mut grid = Grid::default();
        write(&mut grid, "A1", "A1+1");
        let stored = grid.cell(cell(0, "A1")).unwrap();
        assert_eq!(stored.depend_in, set(&[cell(0, "A1")]));
        assert_eq!(stored.depend_out, set(&[cell(0, "A1")]));
        grid.assert_consistent();
    }

    #[test]
    fn test_cycle_marking_terminates() {
        let mut grid = Grid::default();
        write(&mut grid, "A1", "B1");
        write(&mut grid, "B1", "A1");
        grid.dirty.clear();
        grid.mark_dirty(cell(0, "A1"));
        assert_eq!(grid.dirty_cells().len(), 2);
    }

    #[test]
    fn test_unresolvable_reference_becomes_ref_literal() {
        let mut grid = Grid::default();
        write(&mut grid, "A1", "Missing!B2+1");
        let stored = grid.cell(cell(0, "A1")).unwrap();
        assert_eq!(stored.formula, "\"#REF: Missing!B2\"");
        assert!(stored.depend_in.is_empty());

        write(&mut grid, "A2", "Z1");
        assert_eq!(grid.formula(cell(0, "A2")), "\"#REF: Z1\"");
    }

    #[test]
    fn test_explosive_cell_has_no_precedents() {
        let mut grid = Grid::default();
        for (row, (y, x)) in [(1.0, 1.0), (3.0, 2.0), (5.0, 3.0), (7.0, 4.0)].iter().enumerate() {
            grid.set_dependencies(CellId::new(0, row + 1, 1), Cell::with_formula(crate::cell::format_number(*y)));
            grid.set_dependencies(CellId::new(0, row + 1, 2), Cell::with_formula(crate::cell::format_number(*x)));
        }
        crate::recalc::compute_dirty_cells(&mut grid);

        let written = grid.assign_explosive(cell(0, "D1"), "OLS(A1:A4,B1:B4)");
        let stored = grid.cell(cell(0, "D1")).unwrap();
        assert!(stored.is_explosive());
        assert!(stored.depend_in.is_empty());
        assert_eq!(stored.display(), "OLS Regression");
        assert!(written.contains(&cell(0, "E1")));
        assert_eq!(grid.formula(cell(0, "E1")), "\"y hat\"");
        assert!(written.iter().all(|c| grid.is_dirty(*c)));
        grid.assert_consistent();
    }

    proptest! {
        #[test]
        fn prop_set_dependencies_idempotent(
            formula in prop::sample::select(vec![
                "A1+B2", "SUM(A1:C3)", "A1*A1", "Sheet2!B4-C5", "IF(A1>1,B1,C1)", "7", "\"text\"", "D4",
            ]),
            row in 1usize..=20,
            col in 1usize..=6,
        ) {
            let target = CellId::new(0, row, col);
            let mut once = Grid::default();
            once.set_dependencies(target, Cell::with_formula(formula));
            let mut twice = once.clone();
            twice.set_dependencies(target, Cell::with_formula(formula));

            prop_assert_eq!(once.to_snapshot(), twice.to_snapshot());
            twice.assert_consistent();
        }
    }
}
