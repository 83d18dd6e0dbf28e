//! Hyperparameter tuning
//!
//! - Regular and random candidate grids
//! - Parallel (candidate, fold) evaluation with failure tolerance
//! - Metric aggregation, ranking and selection
//! - The final refit on the full training subset

mod config;
mod grid;
mod select;
mod tuner;

pub use config::TuneConfig;
pub use grid::{
    default_range, Candidate, Grid, GridBuilder, Parameter, ParameterSource, ParameterValue,
    Transform,
};
pub use select::{last_fit, LastFit};
pub use tuner::{
    tune_grid, FailureRecord, FailureStage, MetricRecord, MetricSummary, OutOfFoldPrediction,
    TuneResults,
};
