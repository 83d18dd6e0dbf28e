//! Gradient Boosting implementation
//!
//! Squared-error gradient boosting over regression trees, with shrinkage,
//! row subsampling per round, and column subsampling per tree.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use super::{check_xy, Deadline, Regressor};
use crate::error::{Result, VelotuneError};

/// Gradient Boosting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples a node needs to be split
    pub min_samples_split: usize,
    /// Fraction of rows drawn for each tree
    pub subsample: f64,
    /// Fraction of columns drawn for each tree
    pub colsample_bytree: f64,
    /// L2 regularization on leaf values
    pub reg_lambda: f64,
    /// Random seed
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 15,
            learning_rate: 0.3,
            max_depth: 6,
            min_samples_split: 2,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_lambda: 0.0,
            random_state: 42,
        }
    }
}

impl GradientBoostingConfig {
    fn validate(&self) -> Result<()> {
        let invalid = |name: &str, value: String, reason: &str| VelotuneError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        };

        if self.n_estimators == 0 {
            return Err(invalid("trees", "0".into(), "must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid(
                "learn_rate",
                self.learning_rate.to_string(),
                "must be positive",
            ));
        }
        for (name, value) in [
            ("sample_size", self.subsample),
            ("mtry", self.colsample_bytree),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(name, value.to_string(), "must be in (0, 1]"));
            }
        }
        if !(self.reg_lambda >= 0.0 && self.reg_lambda.is_finite()) {
            return Err(invalid(
                "penalty",
                self.reg_lambda.to_string(),
                "must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Gradient Boosting Regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_prediction: f64,
    n_features: usize,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_prediction: 0.0,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn sample_indices(n: usize, fraction: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let sample_size = ((n as f64) * fraction).ceil().max(1.0) as usize;
        if sample_size >= n {
            return (0..n).collect();
        }
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
        indices
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, deadline: &Deadline) -> Result<()> {
        check_xy(x, y)?;
        self.config.validate()?;

        let n_samples = x.nrows();
        let n_features = x.ncols();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        self.trees.clear();
        self.col_indices_per_tree.clear();
        self.n_features = n_features;
        self.initial_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);

        for round in 0..self.config.n_estimators {
            deadline.check()?;

            let residuals: Array1<f64> = y - &predictions;

            let row_indices = Self::sample_indices(n_samples, self.config.subsample, &mut rng);
            let col_indices =
                Self::sample_indices(n_features, self.config.colsample_bytree, &mut rng);

            let x_sub = x.select(Axis(0), &row_indices).select(Axis(1), &col_indices);
            let y_sub = residuals.select(Axis(0), &row_indices);

            let mut tree = DecisionTree::new()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_split(self.config.min_samples_split)
                .with_l2(self.config.reg_lambda);
            tree.fit(&x_sub, &y_sub)?;

            // Every row moves, not just the sampled ones
            let tree_pred = tree.predict(&x.select(Axis(1), &col_indices))?;
            predictions.scaled_add(self.config.learning_rate, &tree_pred);

            if predictions.iter().any(|p| !p.is_finite()) {
                return Err(VelotuneError::FitFailure(format!(
                    "boosting diverged at round {}",
                    round
                )));
            }

            tracing::trace!(
                round,
                depth = tree.get_depth(),
                leaves = tree.get_n_leaves(),
                "Boosting round"
            );
            self.trees.push(tree);
            self.col_indices_per_tree.push(col_indices);
        }

        deadline.check()
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(VelotuneError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(VelotuneError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for (tree, col_indices) in self.trees.iter().zip(self.col_indices_per_tree.iter()) {
            let tree_pred = tree.predict(&x.select(Axis(1), col_indices))?;
            predictions.scaled_add(self.config.learning_rate, &tree_pred);
        }
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sine_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i as f64 / n as f64) + j as f64 * 0.1);
        let y = x.column(0).mapv(|v| (v * 6.0).sin() * 10.0 + 50.0);
        (x, y)
    }

    fn rmse(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
        ((a - b).mapv(|d| d * d).sum() / a.len() as f64).sqrt()
    }

    #[test]
    fn test_boosting_reduces_error() {
        let (x, y) = sine_data(200);
        let baseline = Array1::from_elem(200, y.mean().unwrap());

        let mut model = GradientBoostingRegressor::new(GradientBoostingConfig {
            n_estimators: 30,
            learning_rate: 0.3,
            max_depth: 3,
            ..Default::default()
        });
        model.fit(&x, &y, &Deadline::none()).unwrap();

        let pred = model.predict(&x).unwrap();
        assert_eq!(model.n_trees(), 30);
        assert!(rmse(&pred, &y) < 0.2 * rmse(&baseline, &y));
    }

    #[test]
    fn test_seeded_fit_is_deterministic() {
        let (x, y) = sine_data(100);
        let config = GradientBoostingConfig {
            n_estimators: 10,
            subsample: 0.5,
            colsample_bytree: 0.5,
            random_state: 7,
            ..Default::default()
        };

        let mut a = GradientBoostingRegressor::new(config.clone());
        let mut b = GradientBoostingRegressor::new(config);
        a.fit(&x, &y, &Deadline::none()).unwrap();
        b.fit(&x, &y, &Deadline::none()).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_timeout_is_fit_failure() {
        let (x, y) = sine_data(50);
        let mut model = GradientBoostingRegressor::new(GradientBoostingConfig::default());
        let result = model.fit(&x, &y, &Deadline::after(Duration::ZERO));
        assert!(matches!(result, Err(VelotuneError::FitFailure(_))));
    }

    #[test]
    fn test_invalid_config() {
        let (x, y) = sine_data(20);
        let mut model = GradientBoostingRegressor::new(GradientBoostingConfig {
            subsample: 0.0,
            ..Default::default()
        });
        assert!(matches!(
            model.fit(&x, &y, &Deadline::none()),
            Err(VelotuneError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_predict_before_fit() {
        let model = GradientBoostingRegressor::new(GradientBoostingConfig::default());
        assert!(matches!(
            model.predict(&Array2::zeros((1, 2))),
            Err(VelotuneError::ModelNotFitted)
        ));
    }
}
