//! Sheet metadata and sheet-name rules.

use serde::{Deserialize, Serialize};

/// Sheet metadata. Cells live in the grid's shared store, keyed by sheet
/// index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: usize, cols: usize) -> Self {
        Self { name: name.into(), rows, cols }
    }

    /// (rows, cols)
    pub fn bounds(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Grow to at least `rows` x `cols`. Never shrinks.
    pub fn grow_to(&mut self, rows: usize, cols: usize) {
        self.rows = self.rows.max(rows);
        self.cols = self.cols.max(cols);
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (1..=self.rows).contains(&row) && (1..=self.cols).contains(&col)
    }
}

/// A sheet name must be non-empty, not padded with whitespace, and free of
/// the characters that delimit references (`!`, `:`) or string literals.
pub fn is_valid_sheet_name(name: &str) -> bool {
    !name.is_empty()
        && name.trim() == name
        && !name.chars().any(|c| matches!(c, '!' | ':' | '"') || c.is_control())
}
