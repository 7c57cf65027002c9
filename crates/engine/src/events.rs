//! Outbound notifications.
//!
//! After each edit the grid reports what changed so a front end can redraw
//! without polling. Small edits list the changed cells; large ones ask the
//! front end to refetch the whole view instead.

use serde::Serialize;

use crate::grid::Grid;
use crate::reference::{CellId, SheetIndex};

/// One changed cell as a front end sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangedCell {
    /// `A1`-style reference on its own sheet.
    pub reference: String,
    pub display: String,
    /// Formula text with a leading `=`, or empty for a blank cell.
    pub formula: String,
    pub sheet: SheetIndex,
}

impl ChangedCell {
    pub fn from_grid(grid: &Grid, id: CellId) -> Self {
        let formula = grid.formula(id);
        Self {
            reference: id.a1(),
            display: grid.display(id),
            formula: if formula.is_empty() { String::new() } else { format!("={formula}") },
            sheet: id.sheet,
        }
    }
}

/// Events emitted while applying intents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum GridEvent {
    /// Itemized changes from one edit.
    Changed(Vec<ChangedCell>),

    /// Too many cells changed to list; refetch the view.
    Invalidate,

    /// Fraction of a long recompute pass done, in (0, 1].
    Progress(f64),
}

impl GridEvent {
    /// Changed-cell event for `changed`, or `Invalidate` once the count
    /// reaches the grid's change threshold.
    pub fn for_changes(grid: &Grid, changed: &[CellId]) -> Self {
        if changed.len() >= grid.options().change_threshold {
            GridEvent::Invalidate
        } else {
            GridEvent::Changed(changed.iter().map(|id| ChangedCell::from_grid(grid, *id)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::grid::tests::cell;
    use crate::grid::GridOptions;

    #[test]
    fn test_changed_cell_fields() {
        let mut grid = Grid::default();
        grid.set_dependencies(cell(1, "B3"), Cell::with_formula("1+1"));
        grid.recompute();

        let changed = ChangedCell::from_grid(&grid, cell(1, "B3"));
        assert_eq!(
            changed,
            ChangedCell { reference: "B3".into(), display: "2".into(), formula: "=1+1".into(), sheet: 1 }
        );
        assert_eq!(ChangedCell::from_grid(&grid, cell(0, "C9")).formula, "");
    }

    #[test]
    fn test_threshold_switches_to_invalidate() {
        let grid = Grid::new(GridOptions { change_threshold: 3, ..Default::default() });
        let two = [cell(0, "A1"), cell(0, "A2")];
        let three = [cell(0, "A1"), cell(0, "A2"), cell(0, "A3")];

        assert!(matches!(GridEvent::for_changes(&grid, &two), GridEvent::Changed(cells) if cells.len() == 2));
        assert_eq!(GridEvent::for_changes(&grid, &three), GridEvent::Invalidate);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&GridEvent::Invalidate).unwrap();
        assert_eq!(json, r#"{"event":"invalidate"}"#);
    }
}
