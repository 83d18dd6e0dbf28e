//! Observation tables and the initial train/test split

pub mod split;
pub mod table;

pub use split::{initial_split, strata_keys, Split, SplitConfig};
pub use table::{Column, ColumnData, ColumnKind, ColumnSummary, Table};
