//! In-memory spreadsheet formula engine.

pub mod cell;
pub mod dep_graph;
pub mod error;
pub mod events;
pub mod formula;
pub mod grid;
pub mod ops;
pub mod recalc;
pub mod reference;
pub mod sheet;
