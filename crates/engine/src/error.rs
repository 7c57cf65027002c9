//! Error types for grid operations.
//!
//! Problems with formula text itself are not errors at this level: they end up
//! as visible strings inside the affected cell. These types cover requests the
//! grid cannot carry out at all.

use thiserror::Error;

use crate::reference::SheetIndex;

/// Reference or range text that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefError {
    #[error("malformed reference: {0}")]
    Malformed(String),

    /// One corner is a bare row number, the other a cell reference.
    #[error("wrong reference range: {0}")]
    MixedRange(String),

    #[error("unknown sheet: {0}")]
    UnknownSheet(String),
}

/// An edit intent that was rejected before touching the grid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("sheet {0} does not exist")]
    NoSuchSheet(SheetIndex),

    #[error("a sheet named {0:?} already exists")]
    DuplicateSheet(String),

    #[error("{0:?} is not a valid sheet name")]
    InvalidSheetName(String),

    #[error("cannot remove the last sheet")]
    LastSheet,

    #[error("batch has {refs} references but {texts} values")]
    BatchMismatch { refs: usize, texts: usize },

    #[error("{0} lies outside its sheet")]
    OutOfBounds(String),

    #[error(transparent)]
    Reference(#[from] RefError),
}

/// Snapshot encoding or decoding failed.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot is inconsistent: {0}")]
    Inconsistent(String),
}
