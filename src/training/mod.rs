//! Model training module
//!
//! Provides model specifications, the regression engines behind them, and
//! the resampling used to evaluate them:
//! - Linear regression (normal equations with optional L2 penalty)
//! - Gradient boosted regression trees
//! - V-fold cross-validation with repeats and strata
//! - Regression metrics
//! - Workflows pairing a preprocessing recipe with a model

pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod linear_models;
pub mod metrics;
pub mod spec;
pub mod workflow;

pub use cross_validation::{CrossValidator, Fold, FoldId, Resamples};
pub use decision_tree::{DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use linear_models::LinearRegression;
pub use metrics::{Direction, Metric, MetricSet};
pub use spec::{Engine, FittedModel, Mode, ModelFamily, ModelSpec, ParamSlot};
pub use workflow::{FittedWorkflow, Workflow};

use crate::error::{Result, VelotuneError};
use ndarray::{Array1, Array2};
use std::time::{Duration, Instant};

/// Common interface of the regression engines
pub trait Regressor {
    /// Fit on `x`/`y`, giving up with a fit failure once `deadline` passes
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, deadline: &Deadline) -> Result<()>;

    /// Predict one value per row of `x`
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Cooperative wall-clock limit for a single fit
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// A deadline that never expires
    pub fn none() -> Self {
        Self {
            started: Instant::now(),
            budget: None,
        }
    }

    /// Expires `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget: Some(budget),
        }
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(budget) => Self::after(budget),
            None => Self::none(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.budget
            .map_or(false, |budget| self.started.elapsed() >= budget)
    }

    /// Fit failure if the deadline has passed
    pub fn check(&self) -> Result<()> {
        match self.budget {
            Some(budget) if self.started.elapsed() >= budget => Err(VelotuneError::FitFailure(
                format!("fit exceeded timeout of {:?}", budget),
            )),
            _ => Ok(()),
        }
    }
}

pub(crate) fn check_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(VelotuneError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(VelotuneError::FitFailure("no training rows".to_string()));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(VelotuneError::FitFailure(
            "non-finite value in training data".to_string(),
        ));
    }
    Ok(())
}
