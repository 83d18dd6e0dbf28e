//! Regression metrics

use crate::error::{Result, VelotuneError};
use crate::preprocessing::pearson_correlation;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether smaller or larger metric values are better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Minimize,
    Maximize,
}

/// A regression metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Root mean squared error
    Rmse,
    /// Mean absolute error
    Mae,
    /// Squared correlation between truth and prediction
    Rsq,
    /// Traditional R², 1 - SSE/SST
    RsqTrad,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Rmse => "rmse",
            Metric::Mae => "mae",
            Metric::Rsq => "rsq",
            Metric::RsqTrad => "rsq_trad",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Metric::Rmse | Metric::Mae => Direction::Minimize,
            Metric::Rsq | Metric::RsqTrad => Direction::Maximize,
        }
    }

    /// True if `a` is strictly better than `b` under this metric
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        match self.direction() {
            Direction::Minimize => a < b,
            Direction::Maximize => a > b,
        }
    }

    /// Score predictions against the truth
    pub fn compute(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        let n = y_true.len();
        if n == 0 {
            return Err(VelotuneError::ScoreFailure(format!(
                "{}: no assessment rows",
                self.name()
            )));
        }
        if n != y_pred.len() {
            return Err(VelotuneError::ScoreFailure(format!(
                "{}: {} truths vs {} predictions",
                self.name(),
                n,
                y_pred.len()
            )));
        }
        if y_pred.iter().any(|p| !p.is_finite()) {
            return Err(VelotuneError::ScoreFailure(format!(
                "{}: non-finite prediction",
                self.name()
            )));
        }

        let nf = n as f64;
        let value = match self {
            Metric::Rmse => {
                let mse = y_true
                    .iter()
                    .zip(y_pred.iter())
                    .map(|(t, p)| (t - p).powi(2))
                    .sum::<f64>()
                    / nf;
                mse.sqrt()
            }
            Metric::Mae => {
                y_true
                    .iter()
                    .zip(y_pred.iter())
                    .map(|(t, p)| (t - p).abs())
                    .sum::<f64>()
                    / nf
            }
            Metric::Rsq => {
                let truth = y_true.to_vec();
                let pred = y_pred.to_vec();
                if constant(&truth) || constant(&pred) {
                    return Err(VelotuneError::ScoreFailure(
                        "rsq: zero variance in truth or prediction".to_string(),
                    ));
                }
                pearson_correlation(&truth, &pred).powi(2)
            }
            Metric::RsqTrad => {
                let mean = y_true.sum() / nf;
                let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
                if ss_tot == 0.0 {
                    return Err(VelotuneError::ScoreFailure(
                        "rsq_trad: zero variance in truth".to_string(),
                    ));
                }
                let ss_res: f64 = y_true
                    .iter()
                    .zip(y_pred.iter())
                    .map(|(t, p)| (t - p).powi(2))
                    .sum();
                1.0 - ss_res / ss_tot
            }
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(VelotuneError::ScoreFailure(format!(
                "{}: non-finite value",
                self.name()
            )))
        }
    }
}

fn constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = VelotuneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rmse" => Ok(Metric::Rmse),
            "mae" => Ok(Metric::Mae),
            "rsq" => Ok(Metric::Rsq),
            "rsq_trad" => Ok(Metric::RsqTrad),
            other => Err(VelotuneError::ConfigError(format!("unknown metric {}", other))),
        }
    }
}

/// Ordered, de-duplicated set of metrics; the first is the primary metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSet {
    metrics: Vec<Metric>,
}

impl Default for MetricSet {
    fn default() -> Self {
        Self::new(vec![Metric::Rmse, Metric::Rsq])
    }
}

impl MetricSet {
    pub fn new(metrics: Vec<Metric>) -> Self {
        let mut unique = Vec::with_capacity(metrics.len());
        for m in metrics {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        Self { metrics: unique }
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn primary(&self) -> Option<Metric> {
        self.metrics.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Score every metric, keeping individual failures separate
    pub fn compute(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Vec<(Metric, Result<f64>)> {
        self.metrics
            .iter()
            .map(|m| (*m, m.compute(y_true, y_pred)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_error_metrics() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        let p = array![1.0, 2.0, 3.0, 6.0];
        assert!((Metric::Rmse.compute(&y, &p).unwrap() - 1.0).abs() < 1e-12);
        assert!((Metric::Mae.compute(&y, &p).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rsq_variants() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        // Perfectly correlated but biased
        let p = array![2.0, 3.0, 4.0, 5.0];
        assert!((Metric::Rsq.compute(&y, &p).unwrap() - 1.0).abs() < 1e-12);
        assert!((Metric::RsqTrad.compute(&y, &p).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_score_failures() {
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(
            Metric::Rmse.compute(&empty, &empty),
            Err(VelotuneError::ScoreFailure(_))
        ));

        let y = array![1.0, 2.0];
        assert!(Metric::Rmse.compute(&y, &array![f64::NAN, 1.0]).is_err());
        assert!(Metric::Rsq.compute(&y, &array![3.0, 3.0]).is_err());
    }

    #[test]
    fn test_direction_and_parse() {
        assert_eq!(Metric::Rmse.direction(), Direction::Minimize);
        assert!(Metric::Rsq.is_better(0.9, 0.8));
        assert!(Metric::Mae.is_better(1.0, 2.0));
        assert_eq!("RSQ_TRAD".parse::<Metric>().unwrap(), Metric::RsqTrad);
        assert!("auc".parse::<Metric>().is_err());
    }

    #[test]
    fn test_metric_set_dedups() {
        let set = MetricSet::new(vec![Metric::Rmse, Metric::Rsq, Metric::Rmse]);
        assert_eq!(set.metrics(), &[Metric::Rmse, Metric::Rsq]);
        assert_eq!(set.primary(), Some(Metric::Rmse));
    }
}
