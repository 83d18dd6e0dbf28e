//! Tuning configuration

use crate::training::{Metric, MetricSet};
use crate::utils::ParallelConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a grid tuning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneConfig {
    /// Metrics computed on every assessment set; the first is the primary metric
    pub metrics: MetricSet,

    /// Worker threads (None = rayon's global pool, Some(1) = sequential)
    pub n_jobs: Option<usize>,

    /// Wall-clock limit per (candidate, fold) fit, in seconds
    pub fit_timeout_secs: Option<f64>,

    /// Keep out-of-fold predictions
    pub save_predictions: bool,

    /// Log every failed fit at warn level
    pub verbose: bool,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            metrics: MetricSet::default(),
            n_jobs: None,
            fit_timeout_secs: None,
            save_predictions: false,
            verbose: true,
        }
    }
}

impl TuneConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics = MetricSet::new(metrics);
        self
    }

    /// Builder method to set worker count
    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = Some(n);
        self
    }

    /// Builder method to set per-fit timeout
    pub fn with_fit_timeout(mut self, secs: f64) -> Self {
        self.fit_timeout_secs = Some(secs);
        self
    }

    pub fn with_save_predictions(mut self, save: bool) -> Self {
        self.save_predictions = save;
        self
    }

    pub fn fit_timeout(&self) -> Option<Duration> {
        self.fit_timeout_secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64)
    }

    pub(crate) fn parallel(&self) -> ParallelConfig {
        ParallelConfig {
            n_threads: self.n_jobs,
        }
    }
}
