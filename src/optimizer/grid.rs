//! Hyperparameter grids

use crate::error::{Result, VelotuneError};
use crate::training::spec::{parameter_kind, ParamKind};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Concrete hyperparameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> f64 {
        match self {
            ParameterValue::Float(v) => *v,
            ParameterValue::Int(v) => *v as f64,
        }
    }

    /// Get as int; floats must be integral
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            ParameterValue::Float(_) => None,
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        ParameterValue::Int(v as i64)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) if v.abs() < 1e-3 && *v != 0.0 => write!(f, "{:.3e}", v),
            ParameterValue::Float(v) => write!(f, "{:.4}", v),
        }
    }
}

/// Scale on which grid levels are spaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Identity,
    Log10,
}

impl Transform {
    fn forward(&self, v: f64) -> f64 {
        match self {
            Transform::Identity => v,
            Transform::Log10 => v.log10(),
        }
    }

    fn inverse(&self, v: f64) -> f64 {
        match self {
            Transform::Identity => v,
            Transform::Log10 => 10f64.powf(v),
        }
    }
}

/// Default `(low, high, transform)` for a known tunable parameter
pub fn default_range(name: &str) -> Option<(f64, f64, Transform)> {
    match name {
        "learn_rate" => Some((1e-10, 1e-1, Transform::Log10)),
        "tree_depth" => Some((1.0, 15.0, Transform::Identity)),
        "trees" => Some((1.0, 2000.0, Transform::Identity)),
        "min_n" => Some((2.0, 40.0, Transform::Identity)),
        "penalty" => Some((1e-10, 1.0, Transform::Log10)),
        "sample_size" | "mtry" => Some((0.1, 1.0, Transform::Identity)),
        _ => None,
    }
}

/// Where a parameter's candidate values come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSource {
    Range { low: f64, high: f64 },
    Values(Vec<ParameterValue>),
}

/// A tunable parameter declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub source: ParameterSource,
    pub transform: Transform,
}

impl Parameter {
    /// Declare a known parameter with its default range and transform
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (low, high, transform) = default_range(&name).ok_or_else(|| {
            VelotuneError::InvalidParameter {
                name: name.clone(),
                value: "-".to_string(),
                reason: "no default range; give explicit values or a range".to_string(),
            }
        })?;
        Ok(Self {
            name,
            source: ParameterSource::Range { low, high },
            transform,
        })
    }

    /// Declare a parameter with an explicit range, spaced linearly
    pub fn range(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            source: ParameterSource::Range { low, high },
            transform: Transform::Identity,
        }
    }

    /// Declare a parameter with explicit candidate values
    pub fn values(name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            source: ParameterSource::Values(values),
            transform: Transform::Identity,
        }
    }

    pub fn with_range(mut self, low: f64, high: f64) -> Self {
        self.source = ParameterSource::Range { low, high };
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    fn kind(&self) -> ParamKind {
        parameter_kind(&self.name).unwrap_or(ParamKind::Float)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |value: String, reason: &str| VelotuneError::InvalidParameter {
            name: self.name.clone(),
            value,
            reason: reason.to_string(),
        };
        match &self.source {
            ParameterSource::Range { low, high } => {
                if !(low.is_finite() && high.is_finite() && low <= high) {
                    return Err(invalid(format!("[{}, {}]", low, high), "invalid range"));
                }
                if self.transform == Transform::Log10 && *low <= 0.0 {
                    return Err(invalid(low.to_string(), "log10 range must be positive"));
                }
            }
            ParameterSource::Values(values) => {
                if values.is_empty() {
                    return Err(invalid("[]".to_string(), "no values"));
                }
            }
        }
        Ok(())
    }

    fn typed(&self, v: f64) -> ParameterValue {
        match self.kind() {
            ParamKind::Int => ParameterValue::Int(v.round() as i64),
            ParamKind::Float => ParameterValue::Float(v),
        }
    }

    /// `levels` values evenly spaced on the transformed scale, endpoints included
    pub fn levels(&self, levels: usize) -> Result<Vec<ParameterValue>> {
        self.validate()?;
        let raw: Vec<ParameterValue> = match &self.source {
            ParameterSource::Values(values) => values.clone(),
            ParameterSource::Range { low, high } => {
                let (lo, hi) = (self.transform.forward(*low), self.transform.forward(*high));
                (0..levels)
                    .map(|k| {
                        let t = if levels > 1 {
                            lo + (hi - lo) * k as f64 / (levels - 1) as f64
                        } else {
                            lo
                        };
                        self.typed(self.transform.inverse(t))
                    })
                    .collect()
            }
        };

        let mut unique: Vec<ParameterValue> = Vec::with_capacity(raw.len());
        for v in raw {
            if !unique.contains(&v) {
                unique.push(v);
            }
        }
        Ok(unique)
    }

    /// Uniform draw on the transformed scale
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.source {
            ParameterSource::Values(values) => values[rng.gen_range(0..values.len())],
            ParameterSource::Range { low, high } => {
                let (lo, hi) = (self.transform.forward(*low), self.transform.forward(*high));
                let t = lo + rng.gen::<f64>() * (hi - lo);
                self.typed(self.transform.inverse(t))
            }
        }
    }
}

/// One point of a grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Position in the grid
    pub id: usize,
    /// Display label, e.g. `Model07`
    pub label: String,
    /// Values in parameter declaration order
    pub values: Vec<(String, ParameterValue)>,
}

impl Candidate {
    pub fn new(id: usize, values: Vec<(String, ParameterValue)>) -> Self {
        Self {
            id,
            label: format!("Model{:02}", id + 1),
            values,
        }
    }

    pub fn get(&self, name: &str) -> Option<ParameterValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn names(&self) -> Vec<&str> {
        self.values.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect();
        write!(f, "{} [{}]", self.label, parts.join(", "))
    }
}

/// Finite ordered sequence of candidates over the same parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    parameters: Vec<String>,
    candidates: Vec<Candidate>,
}

impl Grid {
    /// Build a grid from explicit value rows, in parameter order
    pub fn from_rows(parameters: Vec<String>, rows: Vec<Vec<ParameterValue>>) -> Result<Self> {
        let candidates = rows
            .into_iter()
            .enumerate()
            .map(|(id, row)| {
                if row.len() != parameters.len() {
                    return Err(VelotuneError::ShapeError {
                        expected: format!("{} values", parameters.len()),
                        actual: format!("{} values in row {}", row.len(), id),
                    });
                }
                Ok(Candidate::new(id, parameters.iter().cloned().zip(row).collect()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            parameters,
            candidates,
        })
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidate(&self, id: usize) -> Option<&Candidate> {
        self.candidates.get(id)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Builds regular and random grids from parameter declarations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridBuilder {
    parameters: Vec<Parameter>,
}

impl GridBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter to the grid
    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Add a known parameter with its defaults
    pub fn param(self, name: impl Into<String>) -> Result<Self> {
        Ok(self.add(Parameter::new(name)?))
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn validate(&self) -> Result<()> {
        if self.parameters.is_empty() {
            return Err(VelotuneError::ConfigError(
                "grid has no parameters".to_string(),
            ));
        }
        for (i, p) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|q| q.name == p.name) {
                return Err(VelotuneError::ConfigError(format!(
                    "parameter {} declared twice",
                    p.name
                )));
            }
            p.validate()?;
        }
        Ok(())
    }

    fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Cross product of `levels` values per parameter; the first parameter varies slowest
    pub fn regular(&self, levels: usize) -> Result<Grid> {
        self.validate()?;
        if levels == 0 {
            return Err(VelotuneError::ConfigError(
                "levels must be at least 1".to_string(),
            ));
        }

        let per_param = self
            .parameters
            .iter()
            .map(|p| p.levels(levels))
            .collect::<Result<Vec<_>>>()?;

        let mut rows: Vec<Vec<ParameterValue>> = vec![Vec::new()];
        for values in &per_param {
            rows = rows
                .into_iter()
                .flat_map(|prefix| {
                    values.iter().map(move |v| {
                        let mut row = prefix.clone();
                        row.push(*v);
                        row
                    })
                })
                .collect();
        }

        let grid = Grid::from_rows(self.names(), rows)?;
        tracing::debug!(candidates = grid.len(), levels, "Built regular grid");
        Ok(grid)
    }

    /// `size` distinct candidates drawn uniformly on each parameter's transformed scale
    pub fn random(&self, size: usize, seed: u64) -> Result<Grid> {
        self.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut rows: Vec<Vec<ParameterValue>> = Vec::with_capacity(size);

        // Bounded retries so small discrete spaces cannot loop forever
        let max_draws = size.saturating_mul(20).max(100);
        let mut draws = 0;
        while rows.len() < size && draws < max_draws {
            draws += 1;
            let row: Vec<ParameterValue> =
                self.parameters.iter().map(|p| p.sample(&mut rng)).collect();
            if !rows.contains(&row) {
                rows.push(row);
            }
        }

        if rows.len() < size {
            tracing::warn!(requested = size, built = rows.len(), "Random grid has fewer distinct candidates than requested");
        }
        Grid::from_rows(self.names(), rows)
    }
}
