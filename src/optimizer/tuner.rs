//! Grid tuning over resamples
//!
//! Every (candidate, fold) pair is an independent, pure fit: prepare the
//! recipe on the analysis rows, fit the finalized model, score the
//! assessment rows. Failures are recorded per pair and never abort the run.

use super::config::TuneConfig;
use super::grid::{Candidate, Grid, ParameterValue};
use crate::data::Table;
use crate::error::{Result, VelotuneError};
use crate::training::{Deadline, FoldId, Metric, MetricSet, Resamples, Workflow};
use crate::utils::parallel_map_indexed;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

/// One successful metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub candidate: usize,
    pub fold: FoldId,
    pub metric: Metric,
    pub value: f64,
}

/// Where a (candidate, fold) evaluation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Preprocessing, fitting or prediction
    Fit,
    /// Computing one metric
    Score,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Fit => f.write_str("fit"),
            FailureStage::Score => f.write_str("score"),
        }
    }
}

/// A recorded failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub candidate: usize,
    pub fold: FoldId,
    pub stage: FailureStage,
    /// Set for score failures
    pub metric: Option<Metric>,
    pub message: String,
}

/// Out-of-fold prediction for one assessment row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfFoldPrediction {
    pub candidate: usize,
    pub fold: FoldId,
    /// Row index into the resampled table
    pub row: usize,
    pub truth: f64,
    pub prediction: f64,
}

/// Aggregate of one metric over the folds of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub candidate: usize,
    pub label: String,
    pub params: Vec<(String, ParameterValue)>,
    pub metric: Metric,
    pub mean: f64,
    /// Standard error of the mean; absent with fewer than two folds
    pub std_err: Option<f64>,
    pub n: usize,
}

/// Everything recorded by a tuning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneResults {
    grid: Grid,
    metrics: MetricSet,
    n_folds: usize,
    records: Vec<MetricRecord>,
    failures: Vec<FailureRecord>,
    predictions: Option<Vec<OutOfFoldPrediction>>,
    elapsed_secs: f64,
}

impl TuneResults {
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn metric_set(&self) -> &MetricSet {
        &self.metrics
    }

    /// Successful metric values in (candidate, fold, metric) order
    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Out-of-fold predictions, if they were kept
    pub fn predictions(&self) -> Option<&[OutOfFoldPrediction]> {
        self.predictions.as_deref()
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    /// Records for one metric
    pub fn records_for(&self, metric: Metric) -> impl Iterator<Item = &MetricRecord> {
        self.records.iter().filter(move |r| r.metric == metric)
    }

    /// Mean, standard error and count per candidate and metric.
    ///
    /// Candidates with no successful fold for a metric get no row for it.
    pub fn collect_metrics(&self) -> Vec<MetricSummary> {
        let mut summaries = Vec::new();
        for candidate in self.grid.candidates() {
            for &metric in self.metrics.metrics() {
                let values: Vec<f64> = self
                    .records
                    .iter()
                    .filter(|r| r.candidate == candidate.id && r.metric == metric)
                    .map(|r| r.value)
                    .collect();
                if values.is_empty() {
                    continue;
                }

                let n = values.len();
                let mean = values.iter().sum::<f64>() / n as f64;
                let std_err = (n > 1).then(|| {
                    let var =
                        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
                    var.sqrt() / (n as f64).sqrt()
                });

                summaries.push(MetricSummary {
                    candidate: candidate.id,
                    label: candidate.label.clone(),
                    params: candidate.values.clone(),
                    metric,
                    mean,
                    std_err,
                    n,
                });
            }
        }
        summaries
    }
}

/// Result of evaluating one (candidate, fold) pair
enum PairOutcome {
    Scored {
        scores: Vec<(Metric, Result<f64>)>,
        predictions: Vec<OutOfFoldPrediction>,
    },
    FitFailed(VelotuneError),
}

fn check_inputs(
    workflow: &Workflow,
    train: &Table,
    resamples: &Resamples,
    grid: &Grid,
    config: &TuneConfig,
) -> Result<Vec<Workflow>> {
    if config.metrics.is_empty() {
        return Err(VelotuneError::ConfigError("no metrics requested".to_string()));
    }
    train.column(workflow.outcome())?;

    if resamples.n_rows() != train.n_rows() {
        return Err(VelotuneError::ShapeError {
            expected: format!("resamples over {} rows", train.n_rows()),
            actual: format!("{} rows", resamples.n_rows()),
        });
    }
    if resamples.is_empty() || grid.is_empty() {
        return Err(VelotuneError::ConfigError(
            "tuning needs at least one fold and one candidate".to_string(),
        ));
    }

    let tunable: BTreeSet<String> = workflow.spec().tunable().into_iter().collect();
    let gridded: BTreeSet<String> = grid.parameters().iter().cloned().collect();
    if tunable != gridded || gridded.len() != grid.parameters().len() {
        return Err(VelotuneError::ConfigError(format!(
            "grid parameters [{}] do not match tunable parameters [{}]",
            grid.parameters().join(", "),
            tunable.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    let finalized = grid
        .candidates()
        .iter()
        .map(|c| workflow.finalize(c))
        .collect::<Result<Vec<_>>>()?;
    for candidate in &finalized {
        candidate.spec().build()?;
    }

    // Selectors resolve against each step's input, so run the recipe once.
    // Data conditions such as a degenerate column stay per-fold failures.
    if let Err(e) = workflow.recipe().prep(train) {
        if e.is_configuration() {
            return Err(e);
        }
        tracing::debug!(error = %e, "Recipe fails on the full training set");
    }

    Ok(finalized)
}

fn evaluate_pair(
    workflow: &Workflow,
    analysis: &Table,
    assessment: &Table,
    rows: &[usize],
    candidate: usize,
    fold: FoldId,
    config: &TuneConfig,
) -> PairOutcome {
    let deadline = Deadline::from_timeout(config.fit_timeout());

    let fitted = match workflow.fit_with_deadline(analysis, &deadline) {
        Ok(f) => f,
        Err(e) => return PairOutcome::FitFailed(e),
    };
    let predicted = match fitted.predict(assessment) {
        Ok(p) => p,
        Err(e) => return PairOutcome::FitFailed(e),
    };
    let truth = match assessment.vector(workflow.outcome()) {
        Ok(t) => t,
        Err(e) => return PairOutcome::FitFailed(e),
    };

    let predictions = if config.save_predictions {
        rows.iter()
            .zip(truth.iter().zip(predicted.iter()))
            .map(|(&row, (&t, &p))| OutOfFoldPrediction {
                candidate,
                fold,
                row,
                truth: t,
                prediction: p,
            })
            .collect()
    } else {
        Vec::new()
    };

    PairOutcome::Scored {
        scores: config.metrics.compute(&truth, &predicted),
        predictions,
    }
}

/// Evaluate every grid candidate on every fold.
///
/// Configuration problems are reported before any fitting. Individual fit or
/// score failures become [`FailureRecord`]s.
pub fn tune_grid(
    workflow: &Workflow,
    train: &Table,
    resamples: &Resamples,
    grid: &Grid,
    config: &TuneConfig,
) -> Result<TuneResults> {
    let start = Instant::now();
    let finalized = check_inputs(workflow, train, resamples, grid, config)?;

    let fold_tables = resamples
        .folds()
        .iter()
        .map(|fold| Ok((train.take(&fold.analysis)?, train.take(&fold.assessment)?)))
        .collect::<Result<Vec<(Table, Table)>>>()?;

    let n_folds = resamples.len();
    let n_pairs = grid.len() * n_folds;

    tracing::info!(
        candidates = grid.len(),
        folds = n_folds,
        fits = n_pairs,
        threads = ?config.n_jobs,
        "Starting grid tuning"
    );

    let outcomes = parallel_map_indexed(n_pairs, &config.parallel(), |k| {
        let (c, f) = (k / n_folds, k % n_folds);
        let fold = &resamples.folds()[f];
        let (analysis, assessment) = &fold_tables[f];
        evaluate_pair(
            &finalized[c],
            analysis,
            assessment,
            &fold.assessment,
            grid.candidates()[c].id,
            fold.id,
            config,
        )
    })?;

    let mut records = Vec::with_capacity(n_pairs * config.metrics.metrics().len());
    let mut failures = Vec::new();
    let mut predictions = Vec::new();

    for (k, outcome) in outcomes.into_iter().enumerate() {
        let candidate = &grid.candidates()[k / n_folds];
        let fold = resamples.folds()[k % n_folds].id;

        match outcome {
            PairOutcome::FitFailed(e) => {
                if config.verbose {
                    tracing::warn!(candidate = %candidate.label, fold = %fold, error = %e, "Fit failed");
                }
                failures.push(FailureRecord {
                    candidate: candidate.id,
                    fold,
                    stage: FailureStage::Fit,
                    metric: None,
                    message: e.to_string(),
                });
            }
            PairOutcome::Scored {
                scores,
                predictions: pair_predictions,
            } => {
                for (metric, score) in scores {
                    match score {
                        Ok(value) => records.push(MetricRecord {
                            candidate: candidate.id,
                            fold,
                            metric,
                            value,
                        }),
                        Err(e) => {
                            if config.verbose {
                                tracing::warn!(candidate = %candidate.label, fold = %fold, metric = %metric, error = %e, "Scoring failed");
                            }
                            failures.push(FailureRecord {
                                candidate: candidate.id,
                                fold,
                                stage: FailureStage::Score,
                                metric: Some(metric),
                                message: e.to_string(),
                            });
                        }
                    }
                }
                predictions.extend(pair_predictions);
            }
        }
    }

    let elapsed_secs = start.elapsed().as_secs_f64();
    tracing::info!(
        records = records.len(),
        failures = failures.len(),
        elapsed_secs,
        "Grid tuning finished"
    );

    Ok(TuneResults {
        grid: grid.clone(),
        metrics: config.metrics.clone(),
        n_folds,
        records,
        failures,
        predictions: config.save_predictions.then_some(predictions),
        elapsed_secs,
    })
}

#[cfg(test)]
impl TuneResults {
    /// Results assembled from hand-made records
    pub(crate) fn from_records(
        grid: Grid,
        metrics: MetricSet,
        n_folds: usize,
        records: Vec<MetricRecord>,
        failures: Vec<FailureRecord>,
    ) -> Self {
        Self {
            grid,
            metrics,
            n_folds,
            records,
            failures,
            predictions: None,
            elapsed_secs: 0.0,
        }
    }
}

/// Candidate lookup used by selection
pub(crate) fn candidate_of<'a>(results: &'a TuneResults, id: usize) -> Result<&'a Candidate> {
    results
        .grid
        .candidates()
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| VelotuneError::NoUsableResult(format!("candidate {} not in grid", id)))
}
