//! Run configuration
//!
//! A single serializable document describing a full tuning run: how to read
//! the data, how to split it, the recipe, the model, the grid and the
//! resampling scheme.

use crate::data::{strata_keys, SplitConfig, Table};
use crate::error::{Result, VelotuneError};
use crate::optimizer::{Grid, GridBuilder, Parameter, TuneConfig};
use crate::preprocessing::{Recipe, Selector, Step};
use crate::training::{CrossValidator, Metric, ModelSpec, Workflow};
use crate::utils::DataLoader;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the input table is read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub path: Option<PathBuf>,
    /// Columns read as categorical even when their values are numeric codes
    pub nominal_columns: Vec<String>,
    /// Columns dropped right after loading, when present
    pub drop_columns: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: None,
            nominal_columns: [
                "season",
                "yr",
                "mnth",
                "holiday",
                "weekday",
                "workingday",
                "weathersit",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            drop_columns: ["instant", "dteday", "casual", "registered"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Candidate grid declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Explicit parameters; empty means every tunable parameter with its default range
    pub parameters: Vec<Parameter>,
    /// Levels per parameter for a regular grid
    pub levels: usize,
    /// Draw this many random candidates instead of a regular grid
    pub random_size: Option<usize>,
    pub seed: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            levels: 5,
            random_size: None,
            seed: 42,
        }
    }
}

/// Resampling scheme for tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvConfig {
    pub folds: usize,
    pub repeats: usize,
    pub seed: u64,
    /// Stratify folds on the same column as the initial split
    pub stratify: bool,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            repeats: 1,
            seed: 42,
            stratify: true,
        }
    }
}

/// Full description of a tuning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub data: DataConfig,
    pub split: SplitConfig,
    pub recipe: Recipe,
    pub model: ModelSpec,
    pub grid: GridConfig,
    pub cv: CvConfig,
    pub tune: TuneConfig,
    /// Metric used to pick the winning candidate
    pub select_metric: Metric,
}

impl RunConfig {
    /// Daily bike-rental setup: predict `cnt`, tune tree depth and learning rate
    pub fn bike_sharing() -> Result<Self> {
        let model = ModelSpec::boost_tree()
            .set_param("trees", 100)?
            .tune("tree_depth")?
            .tune("learn_rate")?;

        Ok(Self {
            data: DataConfig::default(),
            split: SplitConfig::new(0.7).with_strata("cnt"),
            recipe: Self::default_recipe("cnt"),
            model,
            grid: GridConfig::default(),
            cv: CvConfig::default(),
            tune: TuneConfig::default(),
            select_metric: Metric::Rmse,
        })
    }

    /// Dummy-encode nominal predictors, drop near-zero-variance columns, normalize
    pub fn default_recipe(outcome: &str) -> Recipe {
        Recipe::new(outcome)
            .with_step(Step::dummy(Selector::AllNominalPredictors))
            .with_step(Step::nzv(Selector::AllNumericPredictors))
            .with_step(Step::normalize(Selector::AllNumericPredictors))
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn outcome(&self) -> &str {
        self.recipe.outcome()
    }

    /// Point the run at another outcome column, keeping the recipe steps
    pub fn with_outcome(mut self, outcome: &str) -> Self {
        let mut recipe = Recipe::new(outcome);
        for step in self.recipe.steps() {
            recipe = recipe.with_step(step.clone());
        }
        self.recipe = recipe;
        if self.split.strata.is_some() {
            self.split.strata = Some(outcome.to_string());
        }
        self
    }

    /// Read the configured data file
    pub fn load_table(&self, path: Option<&Path>) -> Result<Table> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| self.data.path.clone())
            .ok_or_else(|| VelotuneError::ConfigError("no data path given".to_string()))?;

        let table = DataLoader::new()
            .with_nominal_columns(self.data.nominal_columns.clone())
            .load_table(&path)?;
        let present: Vec<String> = self
            .data
            .drop_columns
            .iter()
            .filter(|c| table.has_column(c))
            .cloned()
            .collect();
        Ok(table.without_columns(&present))
    }

    pub fn workflow(&self) -> Workflow {
        Workflow::new(self.recipe.clone(), self.model.clone())
    }

    /// Build the candidate grid for the model's tunable parameters
    pub fn build_grid(&self) -> Result<Grid> {
        let builder = if self.grid.parameters.is_empty() {
            self.model
                .tunable()
                .into_iter()
                .try_fold(GridBuilder::new(), |b, name| b.param(name))?
        } else {
            self.grid
                .parameters
                .iter()
                .cloned()
                .fold(GridBuilder::new(), GridBuilder::add)
        };

        match self.grid.random_size {
            Some(size) => builder.random(size, self.grid.seed),
            None => builder.regular(self.grid.levels),
        }
    }

    /// Fold generator for the training subset
    pub fn cross_validator(&self, train: &Table) -> Result<CrossValidator> {
        let cv = CrossValidator::new(self.cv.folds)
            .with_repeats(self.cv.repeats)
            .with_random_state(self.cv.seed);

        match (&self.split.strata, self.cv.stratify) {
            (Some(column), true) => Ok(cv.with_strata(strata_keys(train, column, self.split.breaks)?)),
            _ => Ok(cv),
        }
    }
}
