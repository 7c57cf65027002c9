//! Recompute scheduler.
//!
//! Drains the grid's dirty set in dependency order (Kahn's algorithm over
//! the dirty subgraph). A dependency that is not dirty is already current
//! and does not block. When no dirty cell is ready any more, everything
//! still dirty is stuck behind a cycle and gets a circular-reference value.

use std::collections::BTreeSet;
use std::time::Instant;

use log::{debug, error, trace, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::CellValue;
use crate::formula::eval::evaluate;
use crate::grid::Grid;
use crate::reference::CellId;

/// Optional callbacks for a recompute pass.
#[derive(Default)]
pub struct RecalcHooks<'a> {
    /// Called with the fraction of the pass done, in (0, 1].
    pub progress: Option<&'a mut dyn FnMut(f64)>,
    /// Checked before each cell; returning true stops the pass.
    pub cancel: Option<&'a dyn Fn() -> bool>,
}

/// Report from one recompute pass.
#[derive(Debug, Clone, Default)]
pub struct RecalcReport {
    /// Time taken for the pass in milliseconds.
    pub duration_ms: u64,

    /// Number of dirty cells taken off the dirty set.
    pub cells_recomputed: usize,

    /// True if cycles were detected. Cycle cells hold a
    /// `Circular reference: ...` string.
    pub had_cycles: bool,

    pub cycle: Option<CycleReport>,

    /// Cells whose value differs from before the pass, in processing order.
    pub changed: Vec<CellId>,

    /// The cancel hook fired; unprocessed cells are still dirty.
    pub cancelled: bool,
}

impl RecalcReport {
    /// Fold a follow-up pass into this report.
    pub(crate) fn absorb(&mut self, later: RecalcReport) {
        self.duration_ms += later.duration_ms;
        self.cells_recomputed += later.cells_recomputed;
        self.had_cycles |= later.had_cycles;
        if self.cycle.is_none() {
            self.cycle = later.cycle;
        }
        self.changed.extend(later.changed);
        self.cancelled |= later.cancelled;
    }

    /// Format as a one-line log entry.
    ///
    /// Format: `[recalc/dirty]    3ms  628 cells  changed=12  cycles=0`
    pub fn log_line(&self) -> String {
        let cycle_cells = self.cycle.as_ref().map_or(0, |c| c.cells.len());
        format!(
            "[recalc/dirty] {:>4}ms  {} cells  changed={}  cycles={}{}",
            self.duration_ms,
            self.cells_recomputed,
            self.changed.len(),
            cycle_cells,
            if self.cancelled { "  cancelled" } else { "" },
        )
    }
}

/// Report when a pass ends with cells stuck behind a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Every cell left dirty when the ready set ran out, sorted.
    pub cells: Vec<CellId>,

    /// Human-readable description of the cycle.
    pub message: String,
}

impl CycleReport {
    pub fn new(cells: Vec<CellId>) -> Self {
        let list: Vec<String> = cells.iter().take(5).map(|c| c.to_string()).collect();
        let message = if cells.len() <= 5 {
            format!("Circular reference: {}", list.join(", "))
        } else {
            format!("Circular reference involving {} cells: {}, ...", cells.len(), list.join(", "))
        };
        Self { cells, message }
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CycleReport {}

/// Recompute every dirty cell.
pub fn compute_dirty_cells(grid: &mut Grid) -> RecalcReport {
    compute_dirty_cells_with(grid, RecalcHooks::default())
}

/// Recompute every dirty cell, reporting progress and honoring
/// cancellation through `hooks`.
pub fn compute_dirty_cells_with(grid: &mut Grid, mut hooks: RecalcHooks<'_>) -> RecalcReport {
    let start = Instant::now();
    let mut report = RecalcReport::default();
    let total = grid.dirty.len();
    let report_progress = total > grid.options().progress_min_cells;
    let progress_every = grid.options().progress_every.max(1);

    // Transient edge copies, pruned to the dirty subgraph.
    let mut pending_in: FxHashMap<CellId, FxHashSet<CellId>> = FxHashMap::default();
    let mut pending_out: FxHashMap<CellId, Vec<CellId>> = FxHashMap::default();
    for &id in &grid.dirty {
        let Some(cell) = grid.cell(id) else {
            pending_in.insert(id, FxHashSet::default());
            continue;
        };
        let waiting = cell.depend_in.iter().filter(|p| grid.dirty.contains(p)).copied().collect();
        pending_in.insert(id, waiting);
        pending_out.insert(id, cell.depend_out.iter().copied().collect());
    }

    let mut ready: BTreeSet<CellId> = pending_in
        .iter()
        .filter(|(_, waiting)| waiting.is_empty())
        .map(|(id, _)| *id)
        .collect();

    let language = grid.language_handle();
    while let Some(id) = ready.pop_first() {
        if hooks.cancel.is_some_and(|cancel| cancel()) {
            report.cancelled = true;
            break;
        }

        let computed = match grid.cell(id) {
            Some(cell) if cell.is_explosive() => None,
            Some(cell) => Some(evaluate(&cell.formula, id, &*grid, &language).into_cell_value()),
            None => Some(CellValue::default()),
        };
        if let Some(value) = computed {
            trace!("{id} = {value:?}");
            if store_value(grid, id, value) {
                report.changed.push(id);
            }
        }
        grid.dirty.remove(&id);
        report.cells_recomputed += 1;

        if report_progress && (report.cells_recomputed % progress_every == 0 || report.cells_recomputed == total) {
            if let Some(progress) = hooks.progress.as_mut() {
                progress(report.cells_recomputed as f64 / total as f64);
            }
        }

        for reader in pending_out.remove(&id).unwrap_or_default() {
            if let Some(waiting) = pending_in.get_mut(&reader) {
                if waiting.remove(&id) && waiting.is_empty() {
                    ready.insert(reader);
                }
            }
        }
    }

    if !report.cancelled && !grid.dirty.is_empty() {
        let mut stuck: Vec<CellId> = grid.dirty.drain().collect();
        stuck.sort();

        let unexplained = stuck.iter().any(|id| pending_in.get(id).map_or(true, FxHashSet::is_empty));
        if unexplained {
            error!("recompute stalled with a dirty cell that was not blocked");
        }
        debug_assert!(!unexplained, "ready set drained with unblocked dirty cells");

        for &id in &stuck {
            let message = format!("Circular reference: {}", grid.formula(id));
            if store_value(grid, id, CellValue::String(message)) {
                report.changed.push(id);
            }
        }
        report.cells_recomputed += stuck.len();
        let cycle = CycleReport::new(stuck);
        warn!("{cycle}");
        report.had_cycles = true;
        report.cycle = Some(cycle);
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    debug!("{}", report.log_line());
    report
}

/// Write a computed value, returning whether it changed.
fn store_value(grid: &mut Grid, id: CellId, value: CellValue) -> bool {
    match grid.cell_mut(id) {
        Some(cell) if cell.value == value => false,
        Some(cell) => {
            cell.value = value;
            true
        }
        None => {
            let mut cell = crate::cell::Cell::blank();
            let changed = cell.value != value;
            cell.value = value;
            grid.insert_cell(id, cell);
            changed
        }
    }
}

impl Grid {
    /// Run a recompute pass with no hooks.
    pub fn recompute(&mut self) -> RecalcReport {
        compute_dirty_cells(self)
    }
}
