//! velotune - Cross-validated hyperparameter tuning for regression
//!
//! This crate reproduces a complete tabular modeling workflow:
//! - Stratified train/test splitting
//! - Declarative preprocessing recipes fitted on training rows only
//! - Linear regression and gradient-boosted tree engines
//! - Regular and random hyperparameter grids
//! - Repeated V-fold cross-validation, evaluated in parallel
//! - Selection of the best candidate, final refit and test evaluation
//! - Model persistence
//!
//! # Modules
//!
//! - [`data`] - Observation tables and splitting
//! - [`preprocessing`] - Recipes and their steps
//! - [`training`] - Model specifications, engines, folds and metrics
//! - [`optimizer`] - Grids, the tuning loop and selection
//! - [`export`] - Model serialization
//! - [`config`] - Run configuration
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use velotune::prelude::*;
//!
//! # fn main() -> velotune::Result<()> {
//! let run = RunConfig::bike_sharing()?;
//! let table = run.load_table(Some(std::path::Path::new("day.csv")))?;
//! let split = initial_split(&table, &run.split)?;
//! let train = split.training(&table)?;
//!
//! let resamples = run.cross_validator(&train)?.split(train.n_rows())?;
//! let grid = run.build_grid()?;
//! let results = tune_grid(&run.workflow(), &train, &resamples, &grid, &run.tune)?;
//!
//! let best = results.select_best(Metric::Rmse)?;
//! let fit = last_fit(&run.workflow().finalize(&best)?, &table, &split, &run.tune.metrics)?;
//! println!("test rmse: {:?}", fit.metric(Metric::Rmse));
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Core modules
pub mod data;
pub mod preprocessing;
pub mod training;
pub mod optimizer;

// Utilities
pub mod config;
pub mod export;
pub mod utils;

// Services
pub mod cli;

pub use error::{Result, VelotuneError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, VelotuneError};

    // Data
    pub use crate::data::{initial_split, Column, Split, SplitConfig, Table};

    // Preprocessing
    pub use crate::preprocessing::{PreparedRecipe, Recipe, Selector, Step};

    // Training
    pub use crate::training::{
        CrossValidator, FittedWorkflow, Metric, MetricSet, ModelFamily, ModelSpec, Resamples,
        Workflow,
    };

    // Optimization
    pub use crate::optimizer::{
        last_fit, tune_grid, Candidate, Grid, GridBuilder, Parameter, ParameterValue, Transform,
        TuneConfig, TuneResults,
    };

    // Export
    pub use crate::export::{ModelArtifact, ModelSerializer, SerializationFormat};

    // Configuration
    pub use crate::config::RunConfig;
    pub use crate::utils::DataLoader;
}
