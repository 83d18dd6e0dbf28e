//! Workflows: a preprocessing recipe paired with a model specification

use super::spec::{FittedModel, ModelSpec};
use super::{Deadline, Regressor};
use crate::data::Table;
use crate::error::{Result, VelotuneError};
use crate::optimizer::Candidate;
use crate::preprocessing::{PreparedRecipe, Recipe};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Recipe plus model specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    recipe: Recipe,
    spec: ModelSpec,
}

impl Workflow {
    pub fn new(recipe: Recipe, spec: ModelSpec) -> Self {
        Self { recipe, spec }
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn outcome(&self) -> &str {
        self.recipe.outcome()
    }

    /// Same workflow with the candidate's values substituted into the model spec
    pub fn finalize(&self, candidate: &Candidate) -> Result<Workflow> {
        Ok(Self {
            recipe: self.recipe.clone(),
            spec: self.spec.finalize(candidate)?,
        })
    }

    /// Prepare the recipe on `train` and fit the model
    pub fn fit(&self, train: &Table) -> Result<FittedWorkflow> {
        self.fit_with_deadline(train, &Deadline::none())
    }

    /// Like [`Workflow::fit`], failing once `deadline` passes
    pub fn fit_with_deadline(&self, train: &Table, deadline: &Deadline) -> Result<FittedWorkflow> {
        let start = Instant::now();
        let mut model = self.spec.build()?;

        let prepared = self.recipe.prep(train)?;
        let design = prepared.design_matrix(train)?;
        let y = design.y.ok_or_else(|| VelotuneError::UnknownColumn(self.outcome().to_string()))?;
        deadline.check()?;

        model.fit(&design.x, &y, deadline)?;

        tracing::debug!(
            rows = train.n_rows(),
            features = design.x.ncols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fitted workflow"
        );

        Ok(FittedWorkflow {
            spec: self.spec.clone(),
            prepared,
            model,
        })
    }
}

/// A workflow with a prepared recipe and a fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedWorkflow {
    spec: ModelSpec,
    prepared: PreparedRecipe,
    model: FittedModel,
}

impl FittedWorkflow {
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn prepared(&self) -> &PreparedRecipe {
        &self.prepared
    }

    pub fn model(&self) -> &FittedModel {
        &self.model
    }

    pub fn outcome(&self) -> &str {
        self.prepared.outcome()
    }

    /// Bake `data` with the stored recipe and predict; the outcome column may be absent
    pub fn predict(&self, data: &Table) -> Result<Array1<f64>> {
        let design = self.prepared.design_matrix(data)?;
        self.model.predict(&design.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::preprocessing::{Selector, Step};

    fn table() -> Table {
        let n = 60;
        let temp: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
        let season: Vec<String> = (0..n).map(|i| ((i % 3) + 1).to_string()).collect();
        let cnt: Vec<f64> = (0..n)
            .map(|i| 1000.0 + 4000.0 * temp[i] + if i % 3 == 0 { 300.0 } else { 0.0 })
            .collect();
        Table::new(vec![
            Column::nominal("season", season),
            Column::numeric("temp", temp),
            Column::numeric("cnt", cnt),
        ])
        .unwrap()
    }

    fn recipe() -> Recipe {
        Recipe::new("cnt")
            .with_step(Step::dummy(Selector::AllNominalPredictors))
            .with_step(Step::normalize(Selector::AllNumericPredictors))
    }

    #[test]
    fn test_linear_workflow_recovers_signal() {
        let data = table();
        let fitted = Workflow::new(recipe(), ModelSpec::linear_reg())
            .fit(&data)
            .unwrap();

        let pred = fitted.predict(&data).unwrap();
        let truth = data.numeric("cnt").unwrap();
        for (p, t) in pred.iter().zip(truth) {
            assert!((p - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unresolved_spec_fails() {
        let spec = ModelSpec::boost_tree().tune("trees").unwrap();
        let result = Workflow::new(recipe(), spec).fit(&table());
        assert!(matches!(result, Err(VelotuneError::ConfigError(_))));
    }

    #[test]
    fn test_predict_without_outcome() {
        let data = table();
        let spec = ModelSpec::boost_tree()
            .set_param("trees", 5)
            .unwrap()
            .set_param("tree_depth", 2)
            .unwrap();
        let fitted = Workflow::new(recipe(), spec).fit(&data).unwrap();

        let new_data = data.take(&[0, 1, 2]).unwrap().without_columns(&["cnt".to_string()]);
        assert_eq!(fitted.predict(&new_data).unwrap().len(), 3);
    }
}
