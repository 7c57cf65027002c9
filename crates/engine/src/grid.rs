//! The grid store.
//!
//! All sheets share one sparse cell map keyed by `CellId`. Cells are created
//! on first write and never removed, only cleared back to blank; a missing
//! cell reads as the empty string.
//!
//! # Invariants
//!
//! 1. **Mutual edges:** `x ∈ cell(y).depend_in` iff `y ∈ cell(x).depend_out`.
//! 2. **Clean between passes:** the dirty set is empty before and after every
//!    recompute pass (except after a cancelled pass).
//! 3. **Names and indices agree:** `sheet_index(sheets[i].name) == Some(i)`.

use std::sync::Arc;

use log::info;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::cell::{literal_from_text, Cell, CellValue};
use crate::error::{EditError, SnapshotError};
use crate::formula::eval::{CellLookup, SheetDirectory, Term};
use crate::formula::language::Language;
use crate::reference::{CellId, ReferenceRange, SheetIndex, UnboundRange, UnboundReference};
use crate::sheet::{is_valid_sheet_name, Sheet};

/// Tunables the grid is created with.
#[derive(Debug, Clone, PartialEq)]
pub struct GridOptions {
    pub default_rows: usize,
    pub default_cols: usize,
    pub default_sheets: Vec<String>,
    /// Changed-cell count from which an edit reports a whole-view
    /// invalidation instead of a cell list.
    pub change_threshold: usize,
    /// Passes over more dirty cells than this report progress.
    pub progress_min_cells: usize,
    pub progress_every: usize,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            default_rows: 100,
            default_cols: 15,
            default_sheets: vec!["Sheet1".to_string(), "Sheet2".to_string()],
            change_threshold: 100,
            progress_min_cells: 1000,
            progress_every: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Grid {
    sheets: Vec<Sheet>,
    sheet_lookup: FxHashMap<String, SheetIndex>,
    cells: FxHashMap<CellId, Cell>,
    pub(crate) dirty: FxHashSet<CellId>,
    /// Explosive formulas written by the intent in progress. They run once
    /// the rest of the intent has been recomputed.
    pub(crate) pending_explosive: Vec<(CellId, String)>,
    language: Arc<Language>,
    options: GridOptions,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(GridOptions::default())
    }
}

impl Grid {
    pub fn new(options: GridOptions) -> Self {
        let mut grid = Self::empty(options, Arc::new(Language::standard()));
        let names = grid.options.default_sheets.clone();
        for name in names {
            if is_valid_sheet_name(&name) && !grid.sheet_lookup.contains_key(&name) {
                grid.push_sheet(Sheet::new(name, grid.options.default_rows, grid.options.default_cols));
            }
        }
        if grid.sheets.is_empty() {
            grid.push_sheet(Sheet::new("Sheet1", grid.options.default_rows, grid.options.default_cols));
        }
        grid
    }

    fn empty(options: GridOptions, language: Arc<Language>) -> Self {
        Self {
            sheets: Vec::new(),
            sheet_lookup: FxHashMap::default(),
            cells: FxHashMap::default(),
            dirty: FxHashSet::default(),
            pending_explosive: Vec::new(),
            language,
            options,
        }
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Shared handle to the language, for callers that evaluate while the
    /// grid is mutably borrowed.
    pub(crate) fn language_handle(&self) -> Arc<Language> {
        Arc::clone(&self.language)
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    // =========================================================================
    // Sheets
    // =========================================================================

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, index: SheetIndex) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub(crate) fn check_sheet(&self, index: SheetIndex) -> Result<&Sheet, EditError> {
        self.sheets.get(index).ok_or(EditError::NoSuchSheet(index))
    }

    fn push_sheet(&mut self, sheet: Sheet) -> SheetIndex {
        let index = self.sheets.len();
        self.sheet_lookup.insert(sheet.name.clone(), index);
        self.sheets.push(sheet);
        index
    }

    /// Append a sheet with the default size.
    pub fn add_sheet(&mut self, name: &str) -> Result<SheetIndex, EditError> {
        if !is_valid_sheet_name(name) {
            return Err(EditError::InvalidSheetName(name.to_string()));
        }
        if self.sheet_lookup.contains_key(name) {
            return Err(EditError::DuplicateSheet(name.to_string()));
        }
        let index = self.push_sheet(Sheet::new(name, self.options.default_rows, self.options.default_cols));
        info!("added sheet {name:?} at index {index}");
        Ok(index)
    }

    /// Remove a sheet and its cells.
    ///
    /// Cells of later sheets move down one index, edges included. Edges into
    /// the removed sheet are dropped; formulas naming it evaluate to `#REF`
    /// from then on.
    pub fn remove_sheet(&mut self, index: SheetIndex) -> Result<(), EditError> {
        self.check_sheet(index)?;
        if self.sheets.len() == 1 {
            return Err(EditError::LastSheet);
        }

        let removed = self.sheets.remove(index);
        let shift = |id: CellId| -> Option<CellId> {
            match id.sheet.cmp(&index) {
                std::cmp::Ordering::Less => Some(id),
                std::cmp::Ordering::Equal => None,
                std::cmp::Ordering::Greater => Some(CellId::new(id.sheet - 1, id.row, id.col)),
            }
        };

        // Readers of the removed sheet now see #REF and must recompute.
        let orphaned: Vec<CellId> = self
            .cells
            .iter()
            .filter(|(id, _)| id.sheet == index)
            .flat_map(|(_, cell)| cell.depend_out.iter().copied())
            .filter_map(shift)
            .collect();

        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .filter_map(|(id, mut cell)| {
                let id = shift(id)?;
                cell.depend_in = cell.depend_in.into_iter().filter_map(shift).collect();
                cell.depend_out = cell.depend_out.into_iter().filter_map(shift).collect();
                Some((id, cell))
            })
            .collect();
        self.dirty = std::mem::take(&mut self.dirty).into_iter().filter_map(shift).collect();
        for reader in orphaned {
            self.mark_dirty(reader);
        }

        self.sheet_lookup = self
            .sheets
            .iter()
            .enumerate()
            .map(|(i, sheet)| (sheet.name.clone(), i))
            .collect();
        info!("removed sheet {:?} (index {index})", removed.name);
        Ok(())
    }

    /// Grow a sheet. Smaller requests keep the current size on that axis.
    pub fn resize_sheet(&mut self, index: SheetIndex, rows: usize, cols: usize) -> Result<(), EditError> {
        self.check_sheet(index)?;
        if let Some(sheet) = self.sheets.get_mut(index) {
            sheet.grow_to(rows, cols);
        }
        Ok(())
    }

    // =========================================================================
    // Cells
    // =========================================================================

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    /// The stored cell, or a blank one.
    pub fn cell_or_blank(&self, id: CellId) -> Cell {
        self.cells.get(&id).cloned().unwrap_or_default()
    }

    pub(crate) fn insert_cell(&mut self, id: CellId, cell: Cell) {
        self.cells.insert(id, cell);
    }

    /// All stored cells, in no particular order.
    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> + '_ {
        self.cells.iter().map(|(id, cell)| (*id, cell))
    }

    pub fn value(&self, id: CellId) -> CellValue {
        self.cells.get(&id).map(|c| c.value.clone()).unwrap_or_default()
    }

    pub fn display(&self, id: CellId) -> String {
        self.cells.get(&id).map(Cell::display).unwrap_or_default()
    }

    /// Formula text without `=`.
    pub fn formula(&self, id: CellId) -> &str {
        self.cells.get(&id).map_or("", |c| c.formula.as_str())
    }

    pub fn dirty_cells(&self) -> &FxHashSet<CellId> {
        &self.dirty
    }

    pub fn is_dirty(&self, id: CellId) -> bool {
        self.dirty.contains(&id)
    }

    // =========================================================================
    // Reference text
    // =========================================================================

    /// Resolve reference text like `B3` or `Sheet2!B3` typed by a user.
    /// Unqualified references land on `default_sheet`.
    pub fn resolve_cell(&self, text: &str, default_sheet: SheetIndex) -> Result<CellId, EditError> {
        let written = UnboundReference::parse(text)?;
        let bound = crate::formula::eval::bind_reference(&written, default_sheet, self)
            .ok_or_else(|| crate::error::RefError::UnknownSheet(text.to_string()))?;
        let cell = bound.cell();
        self.check_bounds(cell, text)?;
        Ok(cell)
    }

    /// Resolve range text. A single reference is a one-cell range.
    pub fn resolve_range(&self, text: &str, default_sheet: SheetIndex) -> Result<ReferenceRange, EditError> {
        if !text.contains(':') {
            return self.resolve_cell(text, default_sheet).map(ReferenceRange::single);
        }
        let written = UnboundRange::parse(text)?;
        let bound = crate::formula::refs::bind_range(&written, default_sheet, self)
            .ok_or_else(|| crate::error::RefError::UnknownSheet(text.to_string()))?;
        self.check_bounds(bound.start.cell(), text)?;
        self.check_bounds(bound.end.cell(), text)?;
        Ok(bound)
    }

    fn check_bounds(&self, cell: CellId, text: &str) -> Result<(), EditError> {
        let sheet = self.check_sheet(cell.sheet)?;
        if sheet.contains(cell.row, cell.col) {
            Ok(())
        } else {
            Err(EditError::OutOfBounds(text.to_string()))
        }
    }

    // =========================================================================
    // Bulk exchange
    // =========================================================================

    /// Smallest (rows, cols) block from A1 holding every cell with content.
    ///
    /// Quote characters do not count as content, so `""` is empty.
    pub fn bounding_rectangle(&self, sheet: SheetIndex) -> (usize, usize) {
        self.cells
            .iter()
            .filter(|(id, cell)| id.sheet == sheet && !cell.is_blank())
            .fold((0, 0), |(rows, cols), (id, _)| (rows.max(id.row), cols.max(id.col)))
    }

    /// Last row and column holding content at or beyond (`top`, `left`),
    /// never less than `top` and `left` themselves.
    pub(crate) fn used_extent(&self, sheet: SheetIndex, top: usize, left: usize) -> (usize, usize) {
        self.cells
            .iter()
            .filter(|(id, cell)| id.sheet == sheet && id.row >= top && id.col >= left && !cell.is_blank())
            .fold((top, left), |(rows, cols), (id, _)| (rows.max(id.row), cols.max(id.col)))
    }

    /// Fill a sheet from rows of plain text, starting at A1.
    ///
    /// Entries are trimmed and stored as number or string literals, never
    /// as formulas. The sheet grows to fit. Returns the written cells; the
    /// caller runs the recompute.
    pub fn bulk_set_from_rows(&mut self, sheet: SheetIndex, rows: &[Vec<String>]) -> Result<Vec<CellId>, EditError> {
        self.check_sheet(sheet)?;
        let height = rows.len();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        self.resize_sheet(sheet, height, width)?;

        let mut written = Vec::new();
        for (r, row) in rows.iter().enumerate() {
            for (c, entry) in row.iter().enumerate() {
                let id = CellId::new(sheet, r + 1, c + 1);
                let literal = literal_from_text(entry.trim());
                self.set_dependencies(id, Cell::with_formula(literal));
                written.push(id);
            }
        }
        info!("bulk filled {} cells on sheet {sheet}", written.len());
        Ok(written)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn to_snapshot(&self) -> GridSnapshot {
        let mut cells: Vec<CellEntry> = self
            .cells
            .iter()
            .map(|(id, cell)| CellEntry { id: *id, cell: cell.clone() })
            .collect();
        cells.sort_by_key(|entry| entry.id);
        GridSnapshot { sheets: self.sheets.clone(), cells }
    }

    /// Rebuild a grid from a snapshot. Edges are taken as stored.
    pub fn from_snapshot(snapshot: GridSnapshot, options: GridOptions) -> Result<Self, SnapshotError> {
        if snapshot.sheets.is_empty() {
            return Err(SnapshotError::Inconsistent("no sheets".to_string()));
        }
        let mut grid = Self::empty(options, Arc::new(Language::standard()));
        for sheet in snapshot.sheets {
            if grid.sheet_lookup.contains_key(&sheet.name) {
                return Err(SnapshotError::Inconsistent(format!("duplicate sheet {:?}", sheet.name)));
            }
            grid.push_sheet(sheet);
        }

        let sheet_count = grid.sheets.len();
        for CellEntry { id, cell } in snapshot.cells {
            let dangling = std::iter::once(&id)
                .chain(cell.depend_in.iter())
                .chain(cell.depend_out.iter())
                .find(|edge| edge.sheet >= sheet_count);
            if let Some(edge) = dangling {
                return Err(SnapshotError::Inconsistent(format!("cell {edge} names a missing sheet")));
            }
            grid.cells.insert(id, cell);
        }
        info!("loaded snapshot with {} sheets and {} cells", grid.sheets.len(), grid.cells.len());
        Ok(grid)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(&self.to_snapshot())?)
    }

    pub fn from_json(json: &str, options: GridOptions) -> Result<Self, SnapshotError> {
        let snapshot: GridSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot, options)
    }
}

/// Serialized form of a grid: sheet metadata plus every stored cell with
/// its cached value and both edge sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub sheets: Vec<Sheet>,
    pub cells: Vec<CellEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEntry {
    pub id: CellId,
    pub cell: Cell,
}

impl SheetDirectory for Grid {
    fn sheet_index(&self, name: &str) -> Option<SheetIndex> {
        self.sheet_lookup.get(name).copied()
    }

    fn sheet_name(&self, sheet: SheetIndex) -> Option<&str> {
        self.sheets.get(sheet).map(|s| s.name.as_str())
    }

    fn sheet_bounds(&self, sheet: SheetIndex) -> Option<(usize, usize)> {
        self.sheets.get(sheet).map(Sheet::bounds)
    }
}

impl CellLookup for Grid {
    fn term(&self, cell: CellId) -> Term {
        self.cells
            .get(&cell)
            .map(|c| Term::from_cell_value(&c.value))
            .unwrap_or_else(|| Term::text(""))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn cell(sheet: SheetIndex, a1: &str) -> CellId {
        let r = UnboundReference::parse(a1).unwrap();
        CellId::new(sheet, r.row, r.col)
    }

    #[test]
    fn test_default_grid() {
        let grid = Grid::default();
        assert_eq!(grid.sheet_count(), 2);
        assert_eq!(grid.sheet(0).unwrap().name, "Sheet1");
        assert_eq!(grid.sheet(1).unwrap().bounds(), (100, 15));
        assert_eq!(grid.value(cell(0, "A1")), CellValue::String(String::new()));
        assert_eq!(grid.term(cell(0, "Z99")), Term::text(""));
    }

    #[test]
    fn test_add_sheet_validation() {
        let mut grid = Grid::default();
        assert_eq!(grid.add_sheet("Data"), Ok(2));
        assert_eq!(grid.sheet_index("Data"), Some(2));
        assert_eq!(grid.add_sheet("Data"), Err(EditError::DuplicateSheet("Data".into())));
        assert_eq!(grid.add_sheet(""), Err(EditError::InvalidSheetName(String::new())));
    }

    #[test]
    fn test_remove_sheet_reindexes_cells_and_edges() {
        let mut grid = Grid::default();
        grid.add_sheet("Third").unwrap();
        let on_third = cell(2, "A1");
        let mut stored = Cell::with_formula("1");
        stored.depend_out.insert(cell(1, "B1"));
        stored.depend_out.insert(cell(0, "C1"));
        grid.insert_cell(on_third, stored);
        grid.insert_cell(cell(1, "B1"), Cell::with_formula("2"));

        grid.remove_sheet(1).unwrap();

        assert_eq!(grid.sheet_count(), 2);
        assert_eq!(grid.sheet_index("Third"), Some(1));
        assert_eq!(grid.sheet_index("Sheet2"), None);
        let moved = grid.cell(cell(1, "A1")).unwrap();
        assert_eq!(moved.formula, "1");
        assert_eq!(moved.depend_out.len(), 1);
        assert!(moved.depend_out.contains(&cell(0, "C1")));
        assert!(grid.cell(cell(2, "A1")).is_none());
    }

    #[test]
    fn test_remove_last_sheet_refused() {
        let mut grid = Grid::new(GridOptions { default_sheets: vec!["Only".into()], ..Default::default() });
        assert_eq!(grid.remove_sheet(0), Err(EditError::LastSheet));
        assert_eq!(grid.remove_sheet(5), Err(EditError::NoSuchSheet(5)));
    }

    #[test]
    fn test_resize_only_grows() {
        let mut grid = Grid::default();
        grid.resize_sheet(0, 10, 40).unwrap();
        assert_eq!(grid.sheet(0).unwrap().bounds(), (100, 40));
    }

    #[test]
    fn test_resolve_reference_text() {
        let grid = Grid::default();
        assert_eq!(grid.resolve_cell("B3", 0), Ok(cell(0, "B3")));
        assert_eq!(grid.resolve_cell("Sheet2!B3", 0), Ok(cell(1, "B3")));
        assert!(matches!(grid.resolve_cell("Z1", 0), Err(EditError::OutOfBounds(_))));
        assert!(matches!(grid.resolve_cell("Nope!A1", 0), Err(EditError::Reference(_))));

        let range = grid.resolve_range("A1:B2", 1).unwrap();
        assert_eq!(range.sheet(), 1);
        assert_eq!(range.area(), 4);
        assert_eq!(grid.resolve_range("C3", 0).unwrap(), ReferenceRange::single(cell(0, "C3")));
    }

    #[test]
    fn test_bounding_rectangle_ignores_quotes() {
        let mut grid = Grid::default();
        grid.insert_cell(cell(0, "C2"), Cell::with_formula("5"));
        grid.insert_cell(cell(0, "E9"), Cell::with_formula("\"\""));
        grid.insert_cell(cell(1, "K50"), Cell::with_formula("1"));
        assert_eq!(grid.bounding_rectangle(0), (2, 3));
        assert_eq!(grid.bounding_rectangle(1), (50, 11));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut grid = Grid::default();
        let a1 = cell(0, "A1");
        let b1 = cell(0, "B1");
        let mut source = Cell::with_formula("2");
        source.value = CellValue::Number(2.0);
        source.depend_out.insert(b1);
        let mut follower = Cell::with_formula("A1*2");
        follower.value = CellValue::Number(f64::INFINITY);
        follower.depend_in.insert(a1);
        grid.insert_cell(a1, source);
        grid.insert_cell(b1, follower);

        let json = grid.to_json().unwrap();
        let back = Grid::from_json(&json, GridOptions::default()).unwrap();
        assert_eq!(back.to_snapshot(), grid.to_snapshot());
        assert!(back.cell(b1).unwrap().depend_in.contains(&a1));
        assert!(back.dirty_cells().is_empty());
    }

    #[test]
    fn test_snapshot_rejects_dangling_sheet() {
        let mut snapshot = Grid::default().to_snapshot();
        snapshot.cells.push(CellEntry { id: CellId::new(7, 1, 1), cell: Cell::blank() });
        assert!(matches!(
            Grid::from_snapshot(snapshot, GridOptions::default()),
            Err(SnapshotError::Inconsistent(_))
        ));
    }
}
