//! Edit intents.
//!
//! Every edit a front end can make is an `Intent`. Applying one validates
//! its arguments, writes the affected cells through `set_dependencies`,
//! runs one recompute pass and reports which cells changed.
//!
//! Block operations read everything they need from the grid first and only
//! then start writing, so overlapping source and destination blocks see the
//! grid as it was before the edit.

use std::collections::BTreeSet;

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellInput, CellValue};
use crate::error::EditError;
use crate::events::GridEvent;
use crate::formula::eval::Term;
use crate::formula::translate::{retarget_formula, translate_formula, CutMove};
use crate::grid::Grid;
use crate::recalc::{compute_dirty_cells, compute_dirty_cells_with, RecalcHooks, RecalcReport};
use crate::reference::{delta, CellId, Reference, ReferenceRange, SheetIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Row,
    Column,
}

/// What to do with a row or column. `InsertBefore` is above a row or left
/// of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEdit {
    InsertBefore,
    InsertAfter,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Set a cell from user input (`=formula` or a literal).
    SetFormula { cell: CellId, text: String },
    /// Several `SetFormula`s with one recompute.
    SetBatch { cells: Vec<CellId>, texts: Vec<String> },
    Copy { source: ReferenceRange, destination: ReferenceRange },
    CutMove { source: ReferenceRange, destination: ReferenceRange },
    /// Copy cached values as literals, dropping formulas.
    CopyValueOnly { source: ReferenceRange, destination: ReferenceRange },
    /// Reorder the rows of `range` by the values in `column`.
    Sort { range: ReferenceRange, column: usize, ascending: bool },
    Resize { sheet: SheetIndex, rows: usize, cols: usize },
    AddSheet { name: String },
    RemoveSheet { sheet: SheetIndex },
    InsertOrDeleteRowColumn { kind: LineKind, edit: LineEdit, cell: CellId },
    Clear { range: ReferenceRange },
}

/// Outcome of one applied intent.
#[derive(Debug, Clone, Default)]
pub struct ApplyResult {
    /// Cells written by the intent plus cells whose value changed during
    /// the recompute, without duplicates.
    pub changed: Vec<CellId>,
    pub report: RecalcReport,
    /// The sheet layout changed; a front end should refetch everything.
    pub invalidate: bool,
}

impl ApplyResult {
    pub fn event(&self, grid: &Grid) -> GridEvent {
        if self.invalidate {
            GridEvent::Invalidate
        } else {
            GridEvent::for_changes(grid, &self.changed)
        }
    }
}

fn block(sheet: SheetIndex, top: usize, left: usize, bottom: usize, right: usize) -> ReferenceRange {
    ReferenceRange::new(Reference::new(sheet, top, left), Reference::new(sheet, bottom, right))
}

impl Grid {
    pub fn apply(&mut self, intent: Intent) -> Result<ApplyResult, EditError> {
        self.apply_with(intent, RecalcHooks::default())
    }

    /// Apply an intent, passing `hooks` to the recompute pass.
    pub fn apply_with(&mut self, intent: Intent, hooks: RecalcHooks<'_>) -> Result<ApplyResult, EditError> {
        debug!("apply {intent:?}");
        let mut invalidate = false;
        let written = match intent {
            Intent::SetFormula { cell, text } => {
                self.check_cell(cell)?;
                self.write_input(cell, &text)
            }
            Intent::SetBatch { cells, texts } => {
                if cells.len() != texts.len() {
                    return Err(EditError::BatchMismatch { refs: cells.len(), texts: texts.len() });
                }
                for cell in &cells {
                    self.check_cell(*cell)?;
                }
                let mut written = Vec::new();
                for (cell, text) in cells.into_iter().zip(&texts) {
                    written.extend(self.write_input(cell, text));
                }
                written
            }
            Intent::Copy { source, destination } => {
                self.check_range(&source)?;
                self.check_range(&destination)?;
                self.copy_block(&source, &destination)
            }
            Intent::CutMove { source, destination } => {
                self.check_range(&source)?;
                self.check_range(&destination)?;
                self.cut_block(&source, &destination)
            }
            Intent::CopyValueOnly { source, destination } => {
                self.check_range(&source)?;
                self.check_range(&destination)?;
                self.copy_values(&source, &destination)
            }
            Intent::Sort { range, column, ascending } => {
                self.check_range(&range)?;
                let (_, left, _, right) = range.bounds();
                if !(left..=right).contains(&column) {
                    return Err(EditError::OutOfBounds(format!("sort column {column} of {}", range.a1())));
                }
                self.sort_block(&range, column, ascending)
            }
            Intent::Resize { sheet, rows, cols } => {
                self.resize_sheet(sheet, rows, cols)?;
                invalidate = true;
                Vec::new()
            }
            Intent::AddSheet { name } => {
                self.add_sheet(&name)?;
                invalidate = true;
                Vec::new()
            }
            Intent::RemoveSheet { sheet } => {
                self.remove_sheet(sheet)?;
                invalidate = true;
                Vec::new()
            }
            Intent::InsertOrDeleteRowColumn { kind, edit, cell } => {
                self.check_cell(cell)?;
                invalidate = true;
                self.edit_line(kind, edit, cell)?
            }
            Intent::Clear { range } => {
                self.check_range(&range)?;
                let cells: Vec<CellId> = range.cells().collect();
                for id in &cells {
                    self.set_dependencies(*id, Cell::blank());
                }
                cells
            }
        };
        Ok(self.finish(written, invalidate, hooks))
    }

    /// Fill a sheet from rows of plain text and recompute.
    pub fn import_rows(&mut self, sheet: SheetIndex, rows: &[Vec<String>]) -> Result<ApplyResult, EditError> {
        let written = self.bulk_set_from_rows(sheet, rows)?;
        Ok(self.finish(written, true, RecalcHooks::default()))
    }

    fn finish(&mut self, mut written: Vec<CellId>, invalidate: bool, hooks: RecalcHooks<'_>) -> ApplyResult {
        let mut report = compute_dirty_cells_with(self, hooks);

        // Explosive formulas read the values the first pass produced.
        let pending = std::mem::take(&mut self.pending_explosive);
        if !pending.is_empty() {
            for (id, formula) in pending {
                let still_queued = self.cell(id).is_some_and(|c| c.is_explosive() && c.formula == formula);
                if still_queued {
                    written.extend(self.assign_explosive(id, &formula));
                }
            }
            report.absorb(compute_dirty_cells(self));
        }

        let mut seen = FxHashSet::default();
        let changed: Vec<CellId> = written
            .into_iter()
            .chain(report.changed.iter().copied())
            .filter(|id| seen.insert(*id))
            .collect();
        ApplyResult { changed, report, invalidate }
    }

    fn check_cell(&self, cell: CellId) -> Result<(), EditError> {
        if self.check_sheet(cell.sheet)?.contains(cell.row, cell.col) {
            Ok(())
        } else {
            Err(EditError::OutOfBounds(cell.to_string()))
        }
    }

    fn check_range(&self, range: &ReferenceRange) -> Result<(), EditError> {
        let sheet = self.check_sheet(range.sheet())?;
        let (top, left, bottom, right) = range.bounds();
        if sheet.contains(top, left) && sheet.contains(bottom, right) {
            Ok(())
        } else {
            Err(EditError::OutOfBounds(range.a1()))
        }
    }

    /// Write user input to a cell. Returns every cell written, including
    /// the output block of an explosive formula.
    fn write_input(&mut self, id: CellId, text: &str) -> Vec<CellId> {
        match CellInput::classify(text, self.language()) {
            CellInput::Explosive(formula) => self.queue_explosive(id, formula),
            input => {
                self.set_dependencies(id, Cell::with_formula(input.formula_text()));
                vec![id]
            }
        }
    }

    /// Write formula text that came from another cell.
    fn store_formula(&mut self, id: CellId, formula: String, explosive: bool) -> Vec<CellId> {
        if explosive {
            self.queue_explosive(id, formula)
        } else {
            self.set_dependencies(id, Cell::with_formula(formula));
            vec![id]
        }
    }

    /// Store an explosive formula with an empty status and defer its
    /// evaluation to `finish`, after the other writes of the intent have
    /// been recomputed.
    fn queue_explosive(&mut self, id: CellId, formula: String) -> Vec<CellId> {
        let mut cell = Cell::with_formula(formula.clone());
        cell.value = CellValue::ExplosiveFormula(String::new());
        self.set_dependencies(id, cell);
        self.pending_explosive.push((id, formula));
        vec![id]
    }

    fn source_formula(&self, id: CellId) -> (String, bool) {
        self.cell(id).map_or((String::new(), false), |c| (c.formula.clone(), c.is_explosive()))
    }

    /// Pair each destination cell with the source cell it takes content from.
    ///
    /// A source smaller than the destination repeats to fill it; otherwise
    /// the whole source is laid out from the destination's top-left corner.
    /// Both walk column by column. Destination cells outside their sheet are
    /// dropped.
    pub fn tile_mapping(&self, source: &ReferenceRange, destination: &ReferenceRange) -> Vec<(CellId, CellId)> {
        let Some((rows, cols)) = self.sheet(destination.sheet()).map(|s| s.bounds()) else {
            return Vec::new();
        };
        let (s_top, s_left, s_bottom, s_right) = source.bounds();
        let (d_top, d_left, d_bottom, d_right) = destination.bounds();
        let (src_sheet, dst_sheet) = (source.sheet(), destination.sheet());
        let fits = |row: usize, col: usize| row <= rows && col <= cols;

        let mut mapping = Vec::new();
        if source.area() < destination.area() {
            let height = s_bottom - s_top + 1;
            let width = s_right - s_left + 1;
            for (i, col) in (d_left..=d_right).enumerate() {
                for (j, row) in (d_top..=d_bottom).enumerate() {
                    if fits(row, col) {
                        let from = CellId::new(src_sheet, s_top + j % height, s_left + i % width);
                        mapping.push((CellId::new(dst_sheet, row, col), from));
                    }
                }
            }
        } else {
            for (i, col) in (s_left..=s_right).enumerate() {
                for (j, row) in (s_top..=s_bottom).enumerate() {
                    let (to_row, to_col) = (d_top + j, d_left + i);
                    if fits(to_row, to_col) {
                        mapping.push((CellId::new(dst_sheet, to_row, to_col), CellId::new(src_sheet, row, col)));
                    }
                }
            }
        }
        mapping
    }

    fn copy_block(&mut self, source: &ReferenceRange, destination: &ReferenceRange) -> Vec<CellId> {
        let language = self.language_handle();
        let updates: Vec<(CellId, String, bool)> = self
            .tile_mapping(source, destination)
            .into_iter()
            .map(|(to, from)| {
                let (formula, explosive) = self.source_formula(from);
                (to, translate_formula(&formula, from, to, false, &*self, &language), explosive)
            })
            .collect();

        let mut written = Vec::new();
        for (id, formula, explosive) in updates {
            written.extend(self.store_formula(id, formula, explosive));
        }
        written
    }

    fn copy_values(&mut self, source: &ReferenceRange, destination: &ReferenceRange) -> Vec<CellId> {
        let updates: Vec<(CellId, String)> = self
            .tile_mapping(source, destination)
            .into_iter()
            .map(|(to, from)| (to, self.value(from).literal_formula()))
            .collect();

        let mut written = Vec::with_capacity(updates.len());
        for (id, literal) in updates {
            self.set_dependencies(id, Cell::with_formula(literal));
            written.push(id);
        }
        written
    }

    /// Move a block. Moved formulas keep their meaning; every formula that
    /// read a moved cell is rewritten to read its new location. Source cells
    /// the destination does not cover are cleared.
    fn cut_block(&mut self, source: &ReferenceRange, destination: &ReferenceRange) -> Vec<CellId> {
        let mapping = self.tile_mapping(source, destination);
        let Some(&(first_to, first_from)) = mapping.first() else {
            return Vec::new();
        };
        let (row_delta, col_delta) = delta(first_to, first_from);
        let mut moved = FxHashMap::default();
        for &(to, from) in &mapping {
            moved.entry(from).or_insert(to);
        }
        let cut = CutMove { moved, source: *source, destination_sheet: destination.sheet(), row_delta, col_delta };
        let destinations: FxHashSet<CellId> = mapping.iter().map(|(to, _)| *to).collect();
        let language = self.language_handle();

        let mut updates: Vec<(CellId, String, bool)> = Vec::new();
        for &(to, from) in &mapping {
            let (formula, explosive) = self.source_formula(from);
            let formula = retarget_formula(&formula, from.sheet, to.sheet, &cut, &*self, &language);
            updates.push((to, formula, explosive));
        }

        // Readers that stay put.
        let followers: BTreeSet<CellId> = cut
            .moved
            .keys()
            .filter_map(|from| self.cell(*from))
            .flat_map(|cell| cell.depend_out.iter().copied())
            .filter(|reader| !cut.moved.contains_key(reader) && !destinations.contains(reader))
            .collect();
        for reader in followers {
            let (formula, explosive) = self.source_formula(reader);
            let rewritten = retarget_formula(&formula, reader.sheet, reader.sheet, &cut, &*self, &language);
            if rewritten != formula {
                updates.push((reader, rewritten, explosive));
            }
        }

        let mut written = Vec::new();
        for (id, formula, explosive) in updates {
            written.extend(self.store_formula(id, formula, explosive));
        }
        for from in source.cells() {
            if !destinations.contains(&from) {
                self.set_dependencies(from, Cell::blank());
                written.push(from);
            }
        }
        written
    }

    fn sort_block(&mut self, range: &ReferenceRange, column: usize, ascending: bool) -> Vec<CellId> {
        let (top, left, bottom, right) = range.bounds();
        let sheet = range.sheet();

        let mut order: Vec<(usize, Term)> = (top..=bottom)
            .map(|row| (row, Term::from_cell_value(&self.value(CellId::new(sheet, row, column)))))
            .collect();
        order.sort_by(|(_, a), (_, b)| {
            let ordering = a.sort_cmp(b);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });

        let language = self.language_handle();
        let mut updates: Vec<(CellId, String, bool)> = Vec::new();
        for (offset, (old_row, _)) in order.iter().enumerate() {
            for col in left..=right {
                let from = CellId::new(sheet, *old_row, col);
                let to = CellId::new(sheet, top + offset, col);
                let (formula, explosive) = self.source_formula(from);
                updates.push((to, translate_formula(&formula, from, to, false, &*self, &language), explosive));
            }
        }

        let mut written = Vec::new();
        for (id, formula, explosive) in updates {
            written.extend(self.store_formula(id, formula, explosive));
        }
        written
    }

    /// Insert a row or column by cutting everything after it one step
    /// outward, or delete one by clearing it and cutting the rest back.
    fn edit_line(&mut self, kind: LineKind, edit: LineEdit, at: CellId) -> Result<Vec<CellId>, EditError> {
        let sheet = at.sheet;
        let (rows, cols) = self.check_sheet(sheet)?.bounds();
        let after = usize::from(edit == LineEdit::InsertAfter);

        let written = match (kind, edit) {
            (LineKind::Column, LineEdit::InsertBefore | LineEdit::InsertAfter) => {
                self.resize_sheet(sheet, rows, cols + 1)?;
                let base = at.col + after;
                let (last_row, last_col) = self.used_extent(sheet, 1, base);
                self.cut_block(&block(sheet, 1, base, last_row, last_col), &block(sheet, 1, base + 1, last_row, last_col + 1))
            }
            (LineKind::Row, LineEdit::InsertBefore | LineEdit::InsertAfter) => {
                self.resize_sheet(sheet, rows + 1, cols)?;
                let base = at.row + after;
                let (last_row, last_col) = self.used_extent(sheet, base, 1);
                self.cut_block(&block(sheet, base, 1, last_row, last_col), &block(sheet, base + 1, 1, last_row + 1, last_col))
            }
            (LineKind::Row, LineEdit::Delete) => {
                let line = block(sheet, at.row, 1, at.row, cols);
                let mut written = self.clear_block(&line);
                if at.row < rows {
                    written.extend(self.cut_block(&block(sheet, at.row + 1, 1, rows, cols), &block(sheet, at.row, 1, at.row, 1)));
                }
                written
            }
            (LineKind::Column, LineEdit::Delete) => {
                let line = block(sheet, 1, at.col, rows, at.col);
                let mut written = self.clear_block(&line);
                if at.col < cols {
                    written.extend(self.cut_block(&block(sheet, 1, at.col + 1, rows, cols), &block(sheet, 1, at.col, 1, at.col)));
                }
                written
            }
        };
        Ok(written)
    }

    fn clear_block(&mut self, range: &ReferenceRange) -> Vec<CellId> {
        let cells: Vec<CellId> = range.cells().collect();
        for id in &cells {
            self.set_dependencies(*id, Cell::blank());
        }
        cells
    }
}
