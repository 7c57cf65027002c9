//! CLI Exit Code Registry
//!
//! Scripts driving `gridcalc` rely on these values.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Success                                             |
//! | 1    | I/O failure on stdin, stdout or a snapshot file     |
//! | 2    | Usage error (bad arguments, reported by clap)       |
//! | 3    | Snapshot could not be decoded or is inconsistent    |
//! | 4    | A command was rejected while running with `--strict` |

/// Success - every command was read and handled.
pub const EXIT_SUCCESS: u8 = 0;

/// Reading input or writing output failed.
pub const EXIT_IO: u8 = 1;

/// The `--load` snapshot is not valid grid JSON.
pub const EXIT_SNAPSHOT: u8 = 3;

/// A command line could not be parsed or the grid refused it, and
/// `--strict` was given.
pub const EXIT_REJECTED: u8 = 4;
