//! Model specifications
//!
//! A [`ModelSpec`] names a model family, its mode and engine, and every
//! hyperparameter as either a fixed value or a slot to be tuned.

use super::gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
use super::linear_models::LinearRegression;
use super::{Deadline, Regressor};
use crate::error::{Result, VelotuneError};
use crate::optimizer::{Candidate, ParameterValue};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    LinearReg,
    BoostTree,
}

impl ModelFamily {
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::LinearReg => "linear_reg",
            ModelFamily::BoostTree => "boost_tree",
        }
    }

    pub fn default_engine(&self) -> Engine {
        match self {
            ModelFamily::LinearReg => Engine::Lm,
            ModelFamily::BoostTree => Engine::Gbm,
        }
    }

    pub fn supports(&self, mode: Mode) -> bool {
        mode == Mode::Regression
    }

    /// Hyperparameters this family accepts
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            ModelFamily::LinearReg => &["penalty"],
            ModelFamily::BoostTree => &[
                "trees",
                "tree_depth",
                "learn_rate",
                "min_n",
                "sample_size",
                "mtry",
                "penalty",
                "seed",
            ],
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = VelotuneError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear_reg" | "linear" | "lm" => Ok(ModelFamily::LinearReg),
            "boost_tree" | "boost" | "gbm" | "xgboost" => Ok(ModelFamily::BoostTree),
            other => Err(VelotuneError::ConfigError(format!(
                "unknown model family {}",
                other
            ))),
        }
    }
}

/// Prediction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Regression,
    Classification,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Regression => f.write_str("regression"),
            Mode::Classification => f.write_str("classification"),
        }
    }
}

/// Fitting backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// Least squares via normal equations
    Lm,
    /// Native gradient boosted trees
    Gbm,
}

impl Engine {
    fn family(&self) -> ModelFamily {
        match self {
            Engine::Lm => ModelFamily::LinearReg,
            Engine::Gbm => ModelFamily::BoostTree,
        }
    }
}

/// Value type of a known hyperparameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
}

pub fn parameter_kind(name: &str) -> Option<ParamKind> {
    match name {
        "trees" | "tree_depth" | "min_n" | "seed" => Some(ParamKind::Int),
        "learn_rate" | "sample_size" | "mtry" | "penalty" => Some(ParamKind::Float),
        _ => None,
    }
}

/// Either a fixed value or a placeholder filled in by tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSlot {
    Fixed(ParameterValue),
    Tune,
}

/// Model family, mode, engine and hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    family: ModelFamily,
    mode: Mode,
    engine: Engine,
    params: Vec<(String, ParamSlot)>,
}

impl ModelSpec {
    pub fn new(family: ModelFamily) -> Self {
        Self {
            family,
            mode: Mode::Regression,
            engine: family.default_engine(),
            params: Vec::new(),
        }
    }

    pub fn linear_reg() -> Self {
        Self::new(ModelFamily::LinearReg)
    }

    pub fn boost_tree() -> Self {
        Self::new(ModelFamily::BoostTree)
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn params(&self) -> &[(String, ParamSlot)] {
        &self.params
    }

    pub fn set_mode(mut self, mode: Mode) -> Result<Self> {
        if !self.family.supports(mode) {
            return Err(VelotuneError::UnsupportedMode {
                family: self.family.to_string(),
                mode: mode.to_string(),
            });
        }
        self.mode = mode;
        Ok(self)
    }

    pub fn set_engine(mut self, engine: Engine) -> Result<Self> {
        if engine.family() != self.family {
            return Err(VelotuneError::ConfigError(format!(
                "engine {:?} does not implement {}",
                engine, self.family
            )));
        }
        self.engine = engine;
        Ok(self)
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.family.parameters().contains(&name) {
            Ok(())
        } else {
            Err(VelotuneError::InvalidParameter {
                name: name.to_string(),
                value: "-".to_string(),
                reason: format!("not a {} parameter", self.family),
            })
        }
    }

    fn put(mut self, name: &str, slot: ParamSlot) -> Self {
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = slot,
            None => self.params.push((name.to_string(), slot)),
        }
        self
    }

    /// Fix a hyperparameter to a value
    pub fn set_param(self, name: &str, value: impl Into<ParameterValue>) -> Result<Self> {
        self.check_name(name)?;
        let value = coerce(name, value.into())?;
        Ok(self.put(name, ParamSlot::Fixed(value)))
    }

    /// Mark a hyperparameter for tuning
    pub fn tune(self, name: &str) -> Result<Self> {
        self.check_name(name)?;
        Ok(self.put(name, ParamSlot::Tune))
    }

    /// Names of the tunable slots, in declaration order
    pub fn tunable(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|(_, slot)| *slot == ParamSlot::Tune)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn is_resolved(&self) -> bool {
        self.params.iter().all(|(_, slot)| *slot != ParamSlot::Tune)
    }

    /// Substitute the candidate's values into the tunable slots
    pub fn finalize(&self, candidate: &Candidate) -> Result<Self> {
        let tunable = self.tunable();
        for name in candidate.names() {
            if !tunable.iter().any(|t| t == name) {
                return Err(VelotuneError::ConfigError(format!(
                    "candidate sets {} which is not tunable",
                    name
                )));
            }
        }

        let mut spec = self.clone();
        for name in &tunable {
            let value = candidate.get(name).ok_or_else(|| {
                VelotuneError::ConfigError(format!("candidate has no value for {}", name))
            })?;
            spec = spec.put(name, ParamSlot::Fixed(coerce(name, value)?));
        }
        Ok(spec)
    }

    fn fixed(&self, name: &str) -> Option<ParameterValue> {
        self.params.iter().find_map(|(n, slot)| match slot {
            ParamSlot::Fixed(v) if n == name => Some(*v),
            _ => None,
        })
    }

    fn fixed_usize(&self, name: &str) -> Result<Option<usize>> {
        match self.fixed(name) {
            None => Ok(None),
            Some(v) => match v.as_int() {
                Some(i) if i >= 0 => Ok(Some(i as usize)),
                _ => Err(VelotuneError::InvalidParameter {
                    name: name.to_string(),
                    value: v.to_string(),
                    reason: "must be a non-negative integer".to_string(),
                }),
            },
        }
    }

    /// Instantiate the unfitted engine model
    pub fn build(&self) -> Result<FittedModel> {
        if !self.is_resolved() {
            return Err(VelotuneError::ConfigError(format!(
                "unresolved tuning parameters: {}",
                self.tunable().join(", ")
            )));
        }
        if !self.family.supports(self.mode) {
            return Err(VelotuneError::UnsupportedMode {
                family: self.family.to_string(),
                mode: self.mode.to_string(),
            });
        }

        let model = match self.engine {
            Engine::Lm => {
                let alpha = self.fixed("penalty").map_or(0.0, |v| v.as_float());
                FittedModel::Linear(LinearRegression::new().with_alpha(alpha))
            }
            Engine::Gbm => {
                let defaults = GradientBoostingConfig::default();
                let config = GradientBoostingConfig {
                    n_estimators: self.fixed_usize("trees")?.unwrap_or(defaults.n_estimators),
                    learning_rate: self
                        .fixed("learn_rate")
                        .map_or(defaults.learning_rate, |v| v.as_float()),
                    max_depth: self.fixed_usize("tree_depth")?.unwrap_or(defaults.max_depth),
                    min_samples_split: self
                        .fixed_usize("min_n")?
                        .unwrap_or(defaults.min_samples_split),
                    subsample: self
                        .fixed("sample_size")
                        .map_or(defaults.subsample, |v| v.as_float()),
                    colsample_bytree: self
                        .fixed("mtry")
                        .map_or(defaults.colsample_bytree, |v| v.as_float()),
                    reg_lambda: self
                        .fixed("penalty")
                        .map_or(defaults.reg_lambda, |v| v.as_float()),
                    random_state: self
                        .fixed_usize("seed")?
                        .map_or(defaults.random_state, |s| s as u64),
                };
                FittedModel::Boosted(GradientBoostingRegressor::new(config))
            }
        };
        Ok(model)
    }
}

/// Convert a value to the parameter's declared type
fn coerce(name: &str, value: ParameterValue) -> Result<ParameterValue> {
    match parameter_kind(name) {
        Some(ParamKind::Int) => value.as_int().map(ParameterValue::Int).ok_or_else(|| {
            VelotuneError::InvalidParameter {
                name: name.to_string(),
                value: value.to_string(),
                reason: "must be an integer".to_string(),
            }
        }),
        Some(ParamKind::Float) => Ok(ParameterValue::Float(value.as_float())),
        None => Ok(value),
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(n, slot)| match slot {
                ParamSlot::Fixed(v) => format!("{} = {}", n, v),
                ParamSlot::Tune => format!("{} = tune()", n),
            })
            .collect();
        write!(
            f,
            "{} ({}, engine {:?}) [{}]",
            self.family,
            self.mode,
            self.engine,
            params.join(", ")
        )
    }
}

/// An engine model; unfitted until [`Regressor::fit`] succeeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittedModel {
    Linear(LinearRegression),
    Boosted(GradientBoostingRegressor),
}

impl Regressor for FittedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, deadline: &Deadline) -> Result<()> {
        match self {
            FittedModel::Linear(m) => m.fit(x, y, deadline),
            FittedModel::Boosted(m) => m.fit(x, y, deadline),
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            FittedModel::Linear(m) => m.predict(x),
            FittedModel::Boosted(m) => m.predict(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_unsupported() {
        let result = ModelSpec::linear_reg().set_mode(Mode::Classification);
        assert!(matches!(result, Err(VelotuneError::UnsupportedMode { .. })));
        assert!(ModelSpec::boost_tree().set_mode(Mode::Regression).is_ok());
    }

    #[test]
    fn test_engine_must_match_family() {
        assert!(ModelSpec::linear_reg().set_engine(Engine::Gbm).is_err());
        assert!(ModelSpec::boost_tree().set_engine(Engine::Gbm).is_ok());
    }

    #[test]
    fn test_parameter_names_validated() {
        assert!(matches!(
            ModelSpec::linear_reg().tune("trees"),
            Err(VelotuneError::InvalidParameter { .. })
        ));
        assert!(ModelSpec::boost_tree().set_param("tree_depth", 2.5).is_err());
    }

    #[test]
    fn test_tunable_and_finalize() {
        let spec = ModelSpec::boost_tree()
            .tune("tree_depth")
            .unwrap()
            .set_param("trees", 20)
            .unwrap()
            .tune("learn_rate")
            .unwrap();
        assert_eq!(spec.tunable(), vec!["tree_depth", "learn_rate"]);
        assert!(matches!(spec.build(), Err(VelotuneError::ConfigError(_))));

        let candidate = Candidate::new(
            0,
            vec![
                ("tree_depth".to_string(), ParameterValue::Int(3)),
                ("learn_rate".to_string(), ParameterValue::Float(0.1)),
            ],
        );
        let finalized = spec.finalize(&candidate).unwrap();
        assert!(finalized.is_resolved());

        match finalized.build().unwrap() {
            FittedModel::Boosted(model) => {
                assert_eq!(model.config().max_depth, 3);
                assert_eq!(model.config().n_estimators, 20);
                assert_eq!(model.config().learning_rate, 0.1);
            }
            other => panic!("unexpected model {:?}", other),
        }
    }

    #[test]
    fn test_finalize_rejects_mismatched_candidate() {
        let spec = ModelSpec::boost_tree().tune("trees").unwrap();
        let missing = Candidate::new(0, vec![]);
        assert!(spec.finalize(&missing).is_err());

        let extra = Candidate::new(
            0,
            vec![
                ("trees".to_string(), ParameterValue::Int(5)),
                ("min_n".to_string(), ParameterValue::Int(5)),
            ],
        );
        assert!(spec.finalize(&extra).is_err());
    }
}
