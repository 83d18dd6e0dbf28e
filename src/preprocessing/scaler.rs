//! Feature normalization

use crate::data::{Column, Table};
use crate::error::{Result, VelotuneError};
use serde::{Deserialize, Serialize};

/// Parameters for a normalized column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ScalerParams {
    name: String,
    mean: f64,
    std: f64,
}

/// Centers and scales numeric columns to zero mean and unit (sample) standard deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    params: Vec<ScalerParams>,
}

impl Normalizer {
    /// Learn per-column mean and standard deviation from `table`
    pub fn fit(table: &Table, columns: &[String]) -> Result<Self> {
        let params = columns
            .iter()
            .map(|name| {
                let values = table.numeric(name)?;
                let (mean, std) = mean_std(values);
                if !(std.is_finite() && std > 0.0) {
                    return Err(VelotuneError::DegenerateColumn(name.clone()));
                }
                Ok(ScalerParams {
                    name: name.clone(),
                    mean,
                    std,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { params })
    }

    /// Apply the stored parameters
    pub fn apply(&self, table: &Table) -> Result<Table> {
        let mut result = table.clone();
        for p in &self.params {
            let scaled: Vec<f64> = table
                .numeric(&p.name)?
                .iter()
                .map(|x| (x - p.mean) / p.std)
                .collect();
            result = result.with_column(Column::numeric(p.name.clone(), scaled))?;
        }
        Ok(result)
    }

    /// Stored (mean, std) for a column
    pub fn params_for(&self, name: &str) -> Option<(f64, f64)> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| (p.mean, p.std))
    }
}

/// Mean and sample standard deviation; NaN std for fewer than two values
fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, f64::NAN);
    }
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}
