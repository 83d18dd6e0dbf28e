//! Utility functions and types

pub mod data_loader;
mod parallel;

pub use data_loader::{DataLoader, DataSaver};
pub use parallel::{parallel_map_indexed, ParallelConfig};
