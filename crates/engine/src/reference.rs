//! Cell addressing.
//!
//! A `CellId` is the key every other module uses to find a cell: sheet index
//! plus 1-based row and column. A `Reference` is what a formula writes down:
//! the same coordinates plus the `$` flags that pin an axis during copy.
//!
//! References come in two flavors, like the expression tree they are lexed
//! into:
//! - `UnboundReference = Reference<Option<String>>`: the sheet name exactly as
//!   written (`None` means "the formula's own sheet")
//! - `Reference<SheetIndex>`: the sheet resolved against a grid

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RefError;

/// Position of a sheet in the grid's sheet list.
pub type SheetIndex = usize;

/// Stable key of a cell inside a grid.
///
/// Rows and columns are 1-based, matching the A1 notation users type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub sheet: SheetIndex,
    pub row: usize,
    pub col: usize,
}

impl CellId {
    #[inline]
    pub fn new(sheet: SheetIndex, row: usize, col: usize) -> Self {
        Self { sheet, row, col }
    }

    /// A1-style text without sheet or `$` markers.
    pub fn a1(&self) -> String {
        format!("{}{}", column_to_letters(self.col), self.row)
    }

    /// Unpinned reference to this cell.
    pub fn reference(&self) -> Reference {
        Reference::new(self.sheet, self.row, self.col)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.a1())
    }
}

/// A single-cell reference as written in a formula.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference<S = SheetIndex> {
    pub sheet: S,
    pub row: usize,
    pub col: usize,
    /// `$` before the row digits
    pub fixed_row: bool,
    /// `$` before the column letters
    pub fixed_col: bool,
}

/// Reference whose sheet is still the name written in the formula text.
pub type UnboundReference = Reference<Option<String>>;

impl Reference {
    pub fn new(sheet: SheetIndex, row: usize, col: usize) -> Self {
        Self { sheet, row, col, fixed_row: false, fixed_col: false }
    }

    pub fn cell(&self) -> CellId {
        CellId::new(self.sheet, self.row, self.col)
    }
}

impl<S> Reference<S> {
    /// Replace the sheet component, keeping coordinates and flags.
    pub fn bind<T>(self, sheet: T) -> Reference<T> {
        Reference {
            sheet,
            row: self.row,
            col: self.col,
            fixed_row: self.fixed_row,
            fixed_col: self.fixed_col,
        }
    }

    /// A1 text of the coordinates with `$` markers, no sheet prefix.
    pub fn a1(&self) -> String {
        format!(
            "{}{}{}{}",
            if self.fixed_col { "$" } else { "" },
            column_to_letters(self.col),
            if self.fixed_row { "$" } else { "" },
            self.row
        )
    }
}

impl UnboundReference {
    /// Parse `A1`, `$A$1`, `Sheet2!B3` or `'My Sheet'!C4`.
    pub fn parse(text: &str) -> Result<Self, RefError> {
        let (sheet, rest) = split_sheet_prefix(text)?;
        let coords = parse_a1(rest).ok_or_else(|| RefError::Malformed(text.to_string()))?;
        Ok(coords.bind(sheet))
    }
}

impl fmt::Display for UnboundReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", sheet_prefix(sheet))?;
        }
        f.write_str(&self.a1())
    }
}

/// Two corner references joined by `:`.
///
/// The corners are kept as written; `bounds()` normalizes them so a range
/// typed bottom-up still covers the same rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceRange<S = SheetIndex> {
    pub start: Reference<S>,
    pub end: Reference<S>,
}

pub type UnboundRange = ReferenceRange<Option<String>>;

impl<S> ReferenceRange<S> {
    /// (top, left, bottom, right), inclusive.
    pub fn bounds(&self) -> (usize, usize, usize, usize) {
        (
            self.start.row.min(self.end.row),
            self.start.col.min(self.end.col),
            self.start.row.max(self.end.row),
            self.start.col.max(self.end.col),
        )
    }

    pub fn height(&self) -> usize {
        let (top, _, bottom, _) = self.bounds();
        bottom - top + 1
    }

    pub fn width(&self) -> usize {
        let (_, left, _, right) = self.bounds();
        right - left + 1
    }

    /// Number of member cells.
    pub fn area(&self) -> usize {
        self.height() * self.width()
    }

    pub fn a1(&self) -> String {
        format!("{}:{}", self.start.a1(), self.end.a1())
    }
}

impl ReferenceRange {
    pub fn new(start: Reference, end: Reference) -> Self {
        Self { start, end }
    }

    /// Range covering exactly one cell.
    pub fn single(cell: CellId) -> Self {
        Self::new(cell.reference(), cell.reference())
    }

    pub fn sheet(&self) -> SheetIndex {
        self.start.sheet
    }

    /// Member cells, column by column, top to bottom within each column.
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        let (top, left, bottom, right) = self.bounds();
        let sheet = self.sheet();
        (left..=right).flat_map(move |col| (top..=bottom).map(move |row| CellId::new(sheet, row, col)))
    }

    pub fn contains(&self, cell: CellId) -> bool {
        let (top, left, bottom, right) = self.bounds();
        cell.sheet == self.sheet()
            && (top..=bottom).contains(&cell.row)
            && (left..=right).contains(&cell.col)
    }
}

impl UnboundRange {
    /// Parse `A1:B2`, optionally sheet-qualified (`Sheet2!A1:B2`).
    ///
    /// Both corners must be cell references. Mixing a bare row number with a
    /// cell reference (`A1:10`) is reported separately from other malformed
    /// text.
    pub fn parse(text: &str) -> Result<Self, RefError> {
        let (sheet, rest) = split_sheet_prefix(text)?;
        let (left, right) = rest
            .split_once(':')
            .ok_or_else(|| RefError::Malformed(text.to_string()))?;

        let left_numeric = is_numeric_only(left);
        let right_numeric = is_numeric_only(right);
        if left_numeric != right_numeric {
            return Err(RefError::MixedRange(text.to_string()));
        }

        let start = parse_a1(left).ok_or_else(|| RefError::Malformed(text.to_string()))?;
        let end = parse_a1(right).ok_or_else(|| RefError::Malformed(text.to_string()))?;
        Ok(Self { start: start.bind(sheet.clone()), end: end.bind(sheet) })
    }
}

impl fmt::Display for UnboundRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.start.sheet {
            write!(f, "{}!", sheet_prefix(sheet))?;
        }
        f.write_str(&self.a1())
    }
}

// ============================================================================
// Column letters
// ============================================================================

/// Convert a 1-based column index to letters: 1=A, 26=Z, 27=AA.
///
/// Bijective base 26, so there is no zero digit. Column 0 has no letters.
pub fn column_to_letters(col: usize) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Inverse of `column_to_letters`. Case-insensitive.
///
/// Returns `None` for empty input, non-letters, or overflow.
pub fn letters_to_column(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    letters.bytes().try_fold(0usize, |acc, b| {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        let digit = (b.to_ascii_uppercase() - b'A') as usize + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
}

// ============================================================================
// Delta arithmetic
// ============================================================================

/// Row and column offset that moves `from` onto `to`.
pub fn delta(to: CellId, from: CellId) -> (i64, i64) {
    (
        to.row as i64 - from.row as i64,
        to.col as i64 - from.col as i64,
    )
}

/// Shift a reference by a row/column delta and clamp it into `[1, bound]`.
///
/// With `honor_fixed` set, `$`-pinned axes do not move. Returns the shifted
/// reference and whether clamping kicked in. A zero delta returns the input
/// untouched, even if it already lies outside the bounds.
pub fn apply_delta<S: Clone>(
    reference: &Reference<S>,
    row_delta: i64,
    col_delta: i64,
    honor_fixed: bool,
    (rows, cols): (usize, usize),
) -> (Reference<S>, bool) {
    if row_delta == 0 && col_delta == 0 {
        return (reference.clone(), false);
    }

    let mut row = reference.row as i64;
    let mut col = reference.col as i64;
    if !(honor_fixed && reference.fixed_row) {
        row += row_delta;
    }
    if !(honor_fixed && reference.fixed_col) {
        col += col_delta;
    }

    let (row, row_clamped) = clamp_axis(row, rows);
    let (col, col_clamped) = clamp_axis(col, cols);

    let shifted = Reference {
        sheet: reference.sheet.clone(),
        row,
        col,
        fixed_row: reference.fixed_row,
        fixed_col: reference.fixed_col,
    };
    (shifted, row_clamped || col_clamped)
}

fn clamp_axis(value: i64, bound: usize) -> (usize, bool) {
    let bound = bound.max(1) as i64;
    if value < 1 {
        (1, true)
    } else if value > bound {
        (bound as usize, true)
    } else {
        (value as usize, false)
    }
}

// ============================================================================
// Text helpers
// ============================================================================

/// Parse the coordinate part of a reference: `$?letters$?digits`.
fn parse_a1(text: &str) -> Option<Reference<()>> {
    let bytes = text.as_bytes();
    let mut pos = 0;

    let fixed_col = bytes.first() == Some(&b'$');
    if fixed_col {
        pos += 1;
    }
    let letters_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
        pos += 1;
    }
    let col = letters_to_column(&text[letters_start..pos])?;

    let fixed_row = bytes.get(pos) == Some(&b'$');
    if fixed_row {
        pos += 1;
    }
    let digits = &text[pos..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }

    Some(Reference { sheet: (), row, col, fixed_row, fixed_col })
}

fn is_numeric_only(text: &str) -> bool {
    let text = text.replace('$', "");
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

/// Split an optional `Sheet!` or `'Sheet Name'!` prefix off a reference.
fn split_sheet_prefix(text: &str) -> Result<(Option<String>, &str), RefError> {
    if let Some(quoted) = text.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if let Some(&(_, '\'')) = chars.peek() {
                    chars.next();
                    name.push('\'');
                    continue;
                }
                let rest = &quoted[i + 1..];
                return match rest.strip_prefix('!') {
                    Some(rest) => Ok((Some(name), rest)),
                    None => Err(RefError::Malformed(text.to_string())),
                };
            }
            name.push(c);
        }
        return Err(RefError::Malformed(text.to_string()));
    }

    match text.rsplit_once('!') {
        Some((sheet, rest)) if is_plain_sheet_name(sheet) => Ok((Some(sheet.to_string()), rest)),
        Some(_) => Err(RefError::Malformed(text.to_string())),
        None => Ok((None, text)),
    }
}

/// Sheet names that can be written without quotes: a letter followed by
/// letters, digits, `_` or `.`.
pub fn is_plain_sheet_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Sheet name as it must be written before `!` in a formula.
pub fn sheet_prefix(name: &str) -> String {
    if is_plain_sheet_name(name) {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}
