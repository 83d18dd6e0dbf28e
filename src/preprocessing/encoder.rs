//! Dummy (indicator) encoding of nominal columns

use crate::data::{Column, Table};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Learned levels for one nominal column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EncodedColumn {
    name: String,
    /// Every level seen during fit, in natural order
    levels: Vec<String>,
    /// Levels that get an indicator column
    encoded: Vec<String>,
}

/// Fitted dummy encoder
///
/// The first level of each column is the reference level and gets no
/// indicator, unless one-hot encoding was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DummyEncoder {
    columns: Vec<EncodedColumn>,
    one_hot: bool,
}

impl DummyEncoder {
    /// Learn the levels of `columns` from `table`
    pub fn fit(table: &Table, columns: &[String], one_hot: bool) -> Result<Self> {
        let columns = columns
            .iter()
            .map(|name| {
                let values = table.nominal(name)?;
                let levels = natural_levels(values);
                let encoded = if one_hot {
                    levels.clone()
                } else {
                    levels.iter().skip(1).cloned().collect()
                };
                Ok(EncodedColumn {
                    name: name.clone(),
                    levels,
                    encoded,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { columns, one_hot })
    }

    /// Replace each encoded column with its indicator columns
    pub fn apply(&self, table: &Table) -> Result<Table> {
        let mut result = table.clone();

        for col in &self.columns {
            let values = table.nominal(&col.name)?;

            let unseen = values.iter().filter(|v| !col.levels.contains(v)).count();
            if unseen > 0 {
                tracing::warn!(
                    column = %col.name,
                    rows = unseen,
                    "Unseen levels encoded as all zeros"
                );
            }

            result = result.without_columns(std::slice::from_ref(&col.name));
            for level in &col.encoded {
                let indicator: Vec<f64> = values
                    .iter()
                    .map(|v| if v == level { 1.0 } else { 0.0 })
                    .collect();
                result = result.with_column(Column::numeric(
                    dummy_name(&col.name, level),
                    indicator,
                ))?;
            }
        }

        Ok(result)
    }

    /// Names of the generated indicator columns
    pub fn output_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|c| c.encoded.iter().map(move |l| dummy_name(&c.name, l)))
            .collect()
    }

    pub fn is_one_hot(&self) -> bool {
        self.one_hot
    }
}

fn dummy_name(column: &str, level: &str) -> String {
    format!("{}_{}", column, level)
}

/// Distinct values sorted numerically when every value parses as a number,
/// lexicographically otherwise
fn natural_levels(values: &[String]) -> Vec<String> {
    let distinct: BTreeSet<&String> = values.iter().collect();
    let mut levels: Vec<String> = distinct.into_iter().cloned().collect();

    let parsed: Option<Vec<f64>> = levels.iter().map(|l| l.trim().parse::<f64>().ok()).collect();
    if let Some(keys) = parsed {
        let mut keyed: Vec<(f64, String)> = keys.into_iter().zip(levels).collect();
        keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        levels = keyed.into_iter().map(|(_, l)| l).collect();
    }
    levels
}

impl std::fmt::Display for DummyEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dummy[{}]", self.output_names().join(", "))
    }
}
