//! Declarative preprocessing recipes
//!
//! A [`Recipe`] is an outcome name plus an ordered list of [`Step`]s. Preparing
//! it on a training table fits each step in turn and yields a
//! [`PreparedRecipe`] that replays the learned parameters on any table.

use super::encoder::DummyEncoder;
use super::feature_selection::{ColumnDrop, CorrelationFilter, NzvFilter};
use super::interactions::FeatureInteractions;
use super::scaler::Normalizer;
use crate::data::{ColumnKind, Table};
use crate::error::{Result, VelotuneError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Column selection, resolved to concrete names when a step is fitted.
///
/// Selectors never match the outcome column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selector {
    Name(String),
    StartsWith(String),
    AllNumericPredictors,
    AllNominalPredictors,
}

impl Selector {
    pub fn name(name: impl Into<String>) -> Self {
        Selector::Name(name.into())
    }

    pub fn starts_with(prefix: impl Into<String>) -> Self {
        Selector::StartsWith(prefix.into())
    }

    /// Matching column names in table order
    pub fn resolve(&self, table: &Table, outcome: &str) -> Result<Vec<String>> {
        let predictors = table.columns().iter().filter(|c| c.name() != outcome);
        let names = match self {
            Selector::Name(name) => {
                if name == outcome {
                    return Err(VelotuneError::ConfigError(format!(
                        "step selects the outcome column {}",
                        outcome
                    )));
                }
                table.column(name)?;
                vec![name.clone()]
            }
            Selector::StartsWith(prefix) => predictors
                .filter(|c| c.name().starts_with(prefix.as_str()))
                .map(|c| c.name().to_string())
                .collect(),
            Selector::AllNumericPredictors => predictors
                .filter(|c| c.kind() == ColumnKind::Numeric)
                .map(|c| c.name().to_string())
                .collect(),
            Selector::AllNominalPredictors => predictors
                .filter(|c| c.kind() == ColumnKind::Nominal)
                .map(|c| c.name().to_string())
                .collect(),
        };
        Ok(names)
    }
}

/// An unfitted preprocessing step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// Indicator columns for nominal predictors
    Dummy { selector: Selector, one_hot: bool },
    /// Drop near-zero-variance columns
    Nzv {
        selector: Selector,
        freq_cut: f64,
        unique_cut: f64,
    },
    /// Center and scale
    Normalize { selector: Selector },
    /// Product columns; each term is a list of factors, each factor a selector
    Interact { terms: Vec<Vec<Selector>> },
    /// Drop one of each highly correlated pair
    Corr { selector: Selector, threshold: f64 },
    /// Drop columns unconditionally
    Remove { selector: Selector },
}

impl Step {
    pub fn dummy(selector: Selector) -> Self {
        Step::Dummy {
            selector,
            one_hot: false,
        }
    }

    pub fn nzv(selector: Selector) -> Self {
        let defaults = NzvFilter::default();
        Step::Nzv {
            selector,
            freq_cut: defaults.freq_cut,
            unique_cut: defaults.unique_cut,
        }
    }

    pub fn normalize(selector: Selector) -> Self {
        Step::Normalize { selector }
    }

    pub fn interact(terms: Vec<Vec<Selector>>) -> Self {
        Step::Interact { terms }
    }

    pub fn corr(selector: Selector) -> Self {
        Step::Corr {
            selector,
            threshold: CorrelationFilter::default().threshold(),
        }
    }

    pub fn remove(selector: Selector) -> Self {
        Step::Remove { selector }
    }

    /// Short step name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Dummy { .. } => "dummy",
            Step::Nzv { .. } => "nzv",
            Step::Normalize { .. } => "normalize",
            Step::Interact { .. } => "interact",
            Step::Corr { .. } => "corr",
            Step::Remove { .. } => "rm",
        }
    }

    /// Learn this step's parameters from `table`
    pub fn fit(&self, table: &Table, outcome: &str) -> Result<FittedStep> {
        let fitted = match self {
            Step::Dummy { selector, one_hot } => {
                let columns = selector.resolve(table, outcome)?;
                FittedStep::Dummy(DummyEncoder::fit(table, &columns, *one_hot)?)
            }
            Step::Nzv {
                selector,
                freq_cut,
                unique_cut,
            } => {
                let columns = selector.resolve(table, outcome)?;
                FittedStep::Drop(NzvFilter::new(*freq_cut, *unique_cut).fit(table, &columns)?)
            }
            Step::Normalize { selector } => {
                let columns = selector.resolve(table, outcome)?;
                FittedStep::Normalize(Normalizer::fit(table, &columns)?)
            }
            Step::Interact { terms } => {
                let groups = terms
                    .iter()
                    .map(|factors| {
                        factors
                            .iter()
                            .map(|s| s.resolve(table, outcome))
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()?;
                FittedStep::Interact(FeatureInteractions::from_factor_groups(&groups))
            }
            Step::Corr {
                selector,
                threshold,
            } => {
                let columns = selector.resolve(table, outcome)?;
                FittedStep::Drop(CorrelationFilter::new(*threshold).fit(table, &columns)?)
            }
            Step::Remove { selector } => {
                FittedStep::Drop(ColumnDrop::new(selector.resolve(table, outcome)?))
            }
        };
        Ok(fitted)
    }
}

/// A step with its learned parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittedStep {
    Dummy(DummyEncoder),
    Normalize(Normalizer),
    Interact(FeatureInteractions),
    Drop(ColumnDrop),
}

impl FittedStep {
    /// Transform `table` with the stored parameters
    pub fn apply(&self, table: &Table) -> Result<Table> {
        match self {
            FittedStep::Dummy(encoder) => encoder.apply(table),
            FittedStep::Normalize(scaler) => scaler.apply(table),
            FittedStep::Interact(interactions) => interactions.apply(table),
            FittedStep::Drop(drop) => drop.apply(table),
        }
    }
}

/// Outcome name plus ordered steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    outcome: String,
    steps: Vec<Step>,
}

impl Recipe {
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn outcome(&self) -> &str {
        &self.outcome
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Fit every step on `train`, each on the output of the steps before it
    pub fn prep(&self, train: &Table) -> Result<PreparedRecipe> {
        let start = Instant::now();
        train.column(&self.outcome)?;

        let mut current = train.clone();
        let mut fitted = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let step_fit = step.fit(&current, &self.outcome)?;
            current = step_fit.apply(&current)?;
            fitted.push(step_fit);
        }

        let predictors: Vec<String> = current
            .column_names()
            .into_iter()
            .filter(|n| n != &self.outcome)
            .collect();

        tracing::debug!(
            steps = fitted.len(),
            predictors = predictors.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Prepared recipe"
        );

        Ok(PreparedRecipe {
            outcome: self.outcome.clone(),
            steps: fitted,
            predictors,
        })
    }
}

/// Model inputs built from a baked table
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub x: Array2<f64>,
    /// Outcome values, when the baked table carried the outcome
    pub y: Option<Array1<f64>>,
}

/// A recipe with every step fitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedRecipe {
    outcome: String,
    steps: Vec<FittedStep>,
    predictors: Vec<String>,
}

impl PreparedRecipe {
    pub fn outcome(&self) -> &str {
        &self.outcome
    }

    /// Predictor columns after all steps, in training order
    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    pub fn steps(&self) -> &[FittedStep] {
        &self.steps
    }

    /// Apply the stored transforms to `table`
    pub fn bake(&self, table: &Table) -> Result<Table> {
        self.steps
            .iter()
            .try_fold(table.clone(), |current, step| step.apply(&current))
    }

    /// Bake `table` and extract the numeric predictor matrix and outcome
    pub fn design_matrix(&self, table: &Table) -> Result<DesignMatrix> {
        let baked = self.bake(table)?;

        for name in &self.predictors {
            if baked.column(name)?.kind() == ColumnKind::Nominal {
                return Err(VelotuneError::DataError(format!(
                    "predictor {} is nominal; add a dummy step",
                    name
                )));
            }
        }

        let x = baked.matrix(&self.predictors)?;
        let y = if baked.has_column(&self.outcome) {
            Some(baked.vector(&self.outcome)?)
        } else {
            None
        };
        Ok(DesignMatrix { x, y })
    }
}
