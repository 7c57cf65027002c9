//! Input commands, one JSON object per line.
//!
//! References are plain text (`B2`, `A1:C4`, `Data!A1`) resolved against
//! `sheet`, which defaults to the first sheet.

use gridcalc_engine::error::EditError;
use gridcalc_engine::grid::Grid;
use gridcalc_engine::ops::{Intent, LineEdit, LineKind};
use gridcalc_engine::reference::SheetIndex;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Set {
        cell: String,
        text: String,
        #[serde(default)]
        sheet: SheetIndex,
    },
    Batch {
        cells: Vec<String>,
        texts: Vec<String>,
        #[serde(default)]
        sheet: SheetIndex,
    },
    Copy {
        source: String,
        destination: String,
        #[serde(default)]
        sheet: SheetIndex,
    },
    Cut {
        source: String,
        destination: String,
        #[serde(default)]
        sheet: SheetIndex,
    },
    CopyValues {
        source: String,
        destination: String,
        #[serde(default)]
        sheet: SheetIndex,
    },
    Sort {
        range: String,
        /// Sheet column to sort by (1-based, A = 1), inside `range`.
        column: usize,
        #[serde(default = "ascending")]
        ascending: bool,
        #[serde(default)]
        sheet: SheetIndex,
    },
    Resize {
        sheet: SheetIndex,
        rows: usize,
        cols: usize,
    },
    AddSheet {
        name: String,
    },
    RemoveSheet {
        sheet: SheetIndex,
    },
    Line {
        kind: LineKind,
        edit: LineEdit,
        cell: String,
        #[serde(default)]
        sheet: SheetIndex,
    },
    Clear {
        range: String,
        #[serde(default)]
        sheet: SheetIndex,
    },
    /// Bulk literal load into the top-left corner of `sheet`.
    Import {
        rows: Vec<Vec<String>>,
        #[serde(default)]
        sheet: SheetIndex,
    },
    /// Print one cell without editing anything.
    Get {
        cell: String,
        #[serde(default)]
        sheet: SheetIndex,
    },
    /// Write the grid as a JSON snapshot.
    Save {
        path: String,
    },
}

fn ascending() -> bool {
    true
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        serde_json::from_str(line).map_err(|e| format!("bad command: {e}"))
    }

    /// Resolve the textual references against `grid`.
    ///
    /// Returns `Ok(None)` for commands that are not grid edits.
    pub fn to_intent(&self, grid: &Grid) -> Result<Option<Intent>, EditError> {
        let intent = match self {
            Command::Set { cell, text, sheet } => Intent::SetFormula {
                cell: grid.resolve_cell(cell, *sheet)?,
                text: text.clone(),
            },
            Command::Batch { cells, texts, sheet } => Intent::SetBatch {
                cells: cells
                    .iter()
                    .map(|c| grid.resolve_cell(c, *sheet))
                    .collect::<Result<_, _>>()?,
                texts: texts.clone(),
            },
            Command::Copy { source, destination, sheet } => Intent::Copy {
                source: grid.resolve_range(source, *sheet)?,
                destination: grid.resolve_range(destination, *sheet)?,
            },
            Command::Cut { source, destination, sheet } => Intent::CutMove {
                source: grid.resolve_range(source, *sheet)?,
                destination: grid.resolve_range(destination, *sheet)?,
            },
            Command::CopyValues { source, destination, sheet } => Intent::CopyValueOnly {
                source: grid.resolve_range(source, *sheet)?,
                destination: grid.resolve_range(destination, *sheet)?,
            },
            Command::Sort { range, column, ascending, sheet } => Intent::Sort {
                range: grid.resolve_range(range, *sheet)?,
                column: *column,
                ascending: *ascending,
            },
            Command::Resize { sheet, rows, cols } => Intent::Resize { sheet: *sheet, rows: *rows, cols: *cols },
            Command::AddSheet { name } => Intent::AddSheet { name: name.clone() },
            Command::RemoveSheet { sheet } => Intent::RemoveSheet { sheet: *sheet },
            Command::Line { kind, edit, cell, sheet } => Intent::InsertOrDeleteRowColumn {
                kind: *kind,
                edit: *edit,
                cell: grid.resolve_cell(cell, *sheet)?,
            },
            Command::Clear { range, sheet } => Intent::Clear { range: grid.resolve_range(range, *sheet)? },
            Command::Import { .. } | Command::Get { .. } | Command::Save { .. } => return Ok(None),
        };
        Ok(Some(intent))
    }
}
