//! Ranking, selection and the final refit

use super::grid::Candidate;
use super::tuner::{candidate_of, MetricSummary, TuneResults};
use crate::data::{Split, Table};
use crate::error::{Result, VelotuneError};
use crate::training::{FittedWorkflow, Metric, MetricSet, Workflow};
use ndarray::Array1;
use std::cmp::Ordering;
use std::time::Instant;

impl TuneResults {
    /// The top `n` candidates by aggregate `metric`, best first.
    ///
    /// Ties keep grid order.
    pub fn show_best(&self, metric: Metric, n: usize) -> Result<Vec<MetricSummary>> {
        if !self.metric_set().metrics().contains(&metric) {
            return Err(VelotuneError::ConfigError(format!(
                "metric '{}' was not computed during tuning",
                metric
            )));
        }

        let mut ranked: Vec<MetricSummary> = self
            .collect_metrics()
            .into_iter()
            .filter(|s| s.metric == metric)
            .collect();

        ranked.sort_by(|a, b| {
            if metric.is_better(a.mean, b.mean) {
                Ordering::Less
            } else if metric.is_better(b.mean, a.mean) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });
        ranked.truncate(n);
        Ok(ranked)
    }

    /// The candidate with the best aggregate `metric`
    pub fn select_best(&self, metric: Metric) -> Result<Candidate> {
        let best = self
            .show_best(metric, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                VelotuneError::NoUsableResult(format!(
                    "no candidate produced a {} value on any fold",
                    metric
                ))
            })?;

        let candidate = candidate_of(self, best.candidate)?.clone();
        tracing::info!(
            candidate = %candidate,
            metric = %metric,
            mean = best.mean,
            "Selected best candidate"
        );
        Ok(candidate)
    }
}

/// Outcome of the final fit on the full training subset
#[derive(Debug, Clone)]
pub struct LastFit {
    pub fitted: FittedWorkflow,
    /// Test-set metrics that could be computed, in metric-set order
    pub metrics: Vec<(Metric, f64)>,
    pub predictions: Array1<f64>,
}

impl LastFit {
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.metrics
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, v)| *v)
    }
}

/// Fit `workflow` on the training rows of `split` and score it once on the test rows.
///
/// A failed fit is returned as an error. A metric that cannot be computed on
/// the test rows is logged and left out.
pub fn last_fit(
    workflow: &Workflow,
    data: &Table,
    split: &Split,
    metrics: &MetricSet,
) -> Result<LastFit> {
    if !workflow.spec().is_resolved() {
        return Err(VelotuneError::ConfigError(format!(
            "workflow still has tunable parameters: {}",
            workflow.spec().tunable().join(", ")
        )));
    }

    let start = Instant::now();
    let train = split.training(data)?;
    let test = split.testing(data)?;

    let fitted = workflow.fit(&train)?;
    let predictions = fitted.predict(&test)?;
    let truth = test.vector(workflow.outcome())?;

    let mut scored = Vec::new();
    for (metric, value) in metrics.compute(&truth, &predictions) {
        match value {
            Ok(v) => scored.push((metric, v)),
            Err(e) => tracing::warn!(metric = %metric, error = %e, "Test metric unavailable"),
        }
    }

    tracing::info!(
        train_rows = train.n_rows(),
        test_rows = test.n_rows(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Final fit complete"
    );

    Ok(LastFit {
        fitted,
        metrics: scored,
        predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::tuner::{FailureRecord, FailureStage, MetricRecord};
    use crate::optimizer::{Grid, GridBuilder, Parameter};
    use crate::training::FoldId;

    fn grid() -> Grid {
        GridBuilder::new()
            .add(Parameter::values(
                "penalty",
                vec![0.0.into(), 0.1.into(), 1.0.into()],
            ))
            .regular(1)
            .unwrap()
    }

    fn record(candidate: usize, fold: usize, metric: Metric, value: f64) -> MetricRecord {
        MetricRecord {
            candidate,
            fold: FoldId { repeat: 0, fold },
            metric,
            value,
        }
    }

    fn results(records: Vec<MetricRecord>) -> TuneResults {
        TuneResults::from_records(grid(), MetricSet::default(), 2, records, Vec::new())
    }

    #[test]
    fn test_select_minimizes_rmse_and_maximizes_rsq() {
        let res = results(vec![
            record(0, 0, Metric::Rmse, 10.0),
            record(0, 0, Metric::Rsq, 0.5),
            record(1, 0, Metric::Rmse, 8.0),
            record(1, 0, Metric::Rsq, 0.4),
            record(2, 0, Metric::Rmse, 9.0),
            record(2, 0, Metric::Rsq, 0.9),
        ]);

        assert_eq!(res.select_best(Metric::Rmse).unwrap().id, 1);
        assert_eq!(res.select_best(Metric::Rsq).unwrap().id, 2);

        let top = res.show_best(Metric::Rmse, 2).unwrap();
        assert_eq!(top.iter().map(|s| s.candidate).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_ties_go_to_earliest_candidate() {
        let res = results(vec![
            record(0, 0, Metric::Rmse, 9.0),
            record(1, 0, Metric::Rmse, 7.0),
            record(2, 0, Metric::Rmse, 7.0),
        ]);
        assert_eq!(res.select_best(Metric::Rmse).unwrap().id, 1);
    }

    #[test]
    fn test_all_failed_is_no_usable_result() {
        let failures = vec![FailureRecord {
            candidate: 0,
            fold: FoldId { repeat: 0, fold: 0 },
            stage: FailureStage::Fit,
            metric: None,
            message: "boom".to_string(),
        }];
        let res = TuneResults::from_records(grid(), MetricSet::default(), 2, Vec::new(), failures);

        assert!(res.collect_metrics().is_empty());
        assert!(matches!(
            res.select_best(Metric::Rmse),
            Err(VelotuneError::NoUsableResult(_))
        ));
    }

    #[test]
    fn test_metric_not_computed() {
        let res = results(vec![record(0, 0, Metric::Rmse, 1.0)]);
        assert!(matches!(
            res.show_best(Metric::Mae, 3),
            Err(VelotuneError::ConfigError(_))
        ));
    }
}
