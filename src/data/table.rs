//! Column-oriented observation table
//!
//! Every column carries a fixed semantic kind, decided once when the table
//! is built: continuous numeric values or nominal (categorical) labels.

use crate::error::{Result, VelotuneError};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Semantic kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Nominal,
}

/// Typed column storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Nominal(Vec<String>),
}

/// A named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    /// Create a numeric column
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    /// Create a nominal column
    pub fn nominal<S: Into<String>>(name: impl Into<String>, values: Vec<S>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Nominal(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        match self.data {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Nominal(_) => ColumnKind::Nominal,
        }
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Nominal(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric values, if this is a numeric column
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Nominal(_) => None,
        }
    }

    /// Nominal values, if this is a nominal column
    pub fn as_nominal(&self) -> Option<&[String]> {
        match &self.data {
            ColumnData::Nominal(v) => Some(v),
            ColumnData::Numeric(_) => None,
        }
    }

    fn take(&self, rows: &[usize]) -> Self {
        let data = match &self.data {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Nominal(v) => {
                ColumnData::Nominal(rows.iter().map(|&i| v[i].clone()).collect())
            }
        };
        Self {
            name: self.name.clone(),
            data,
        }
    }
}

/// Per-column summary statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub levels: Option<Vec<String>>,
}

/// Ordered, column-oriented observation table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Build a table, checking that all columns have the same length and unique names
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = HashSet::new();
        for col in &columns {
            if col.len() != n_rows {
                return Err(VelotuneError::ShapeError {
                    expected: format!("{} rows", n_rows),
                    actual: format!("{} rows in column {}", col.len(), col.name),
                });
            }
            if !seen.insert(col.name.clone()) {
                return Err(VelotuneError::DataError(format!(
                    "duplicate column name: {}",
                    col.name
                )));
            }
        }
        Ok(Self { columns, n_rows })
    }

    /// Convert a polars DataFrame.
    ///
    /// Columns listed in `nominal` become nominal regardless of dtype, string
    /// columns become nominal, and everything castable to `f64` becomes numeric.
    /// Columns of any other dtype are skipped.
    pub fn from_dataframe(df: &DataFrame, nominal: &[String]) -> Result<Self> {
        for name in nominal {
            if df.column(name).is_err() {
                return Err(VelotuneError::UnknownColumn(name.clone()));
            }
        }

        let mut columns = Vec::with_capacity(df.width());
        for col in df.get_columns() {
            let name = col.name().to_string();
            let series = col.as_materialized_series();

            let force_nominal = nominal.iter().any(|n| n == &name);
            let column = if force_nominal || matches!(series.dtype(), DataType::String) {
                Some(Self::nominal_from_series(&name, series)?)
            } else {
                match series.cast(&DataType::Float64) {
                    Ok(casted) => Some(Self::numeric_from_series(&name, &casted)?),
                    Err(e) => {
                        tracing::warn!(column = %name, error = %e, "Skipping column that is neither numeric nor text");
                        None
                    }
                }
            };
            columns.extend(column);
        }

        Self::new(columns)
    }

    fn numeric_from_series(name: &str, series: &Series) -> Result<Column> {
        let values = series
            .f64()?
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| VelotuneError::DataError(format!("missing value in column {}", name)))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Column::numeric(name, values))
    }

    fn nominal_from_series(name: &str, series: &Series) -> Result<Column> {
        let casted = series.cast(&DataType::String)?;
        let values = casted
            .str()?
            .into_iter()
            .map(|v| {
                v.map(str::to_string)
                    .ok_or_else(|| VelotuneError::DataError(format!("missing value in column {}", name)))
            })
            .collect::<Result<Vec<String>>>()?;
        Ok(Column::nominal(name, values))
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| VelotuneError::UnknownColumn(name.to_string()))
    }

    /// Numeric values of a column; nominal columns are a data error
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        self.column(name)?.as_numeric().ok_or_else(|| {
            VelotuneError::DataError(format!("column {} is nominal, expected numeric", name))
        })
    }

    /// Nominal values of a column; numeric columns are a data error
    pub fn nominal(&self, name: &str) -> Result<&[String]> {
        self.column(name)?.as_nominal().ok_or_else(|| {
            VelotuneError::DataError(format!("column {} is numeric, expected nominal", name))
        })
    }

    /// Select rows by index, in the given order
    pub fn take(&self, rows: &[usize]) -> Result<Self> {
        if let Some(&bad) = rows.iter().find(|&&i| i >= self.n_rows) {
            return Err(VelotuneError::ShapeError {
                expected: format!("row index < {}", self.n_rows),
                actual: bad.to_string(),
            });
        }
        Ok(Self {
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            n_rows: rows.len(),
        })
    }

    /// Add a column, replacing an existing column of the same name in place
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        if !self.columns.is_empty() && column.len() != self.n_rows {
            return Err(VelotuneError::ShapeError {
                expected: format!("{} rows", self.n_rows),
                actual: format!("{} rows in column {}", column.len(), column.name),
            });
        }
        if self.columns.is_empty() {
            self.n_rows = column.len();
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    /// Drop the named columns; names that are absent are ignored
    pub fn without_columns(mut self, names: &[String]) -> Self {
        let drop: HashSet<&str> = names.iter().map(String::as_str).collect();
        self.columns.retain(|c| !drop.contains(c.name.as_str()));
        self
    }

    /// Dense matrix of the named numeric columns, in the given order
    pub fn matrix(&self, names: &[String]) -> Result<Array2<f64>> {
        let cols = names
            .iter()
            .map(|n| self.numeric(n))
            .collect::<Result<Vec<_>>>()?;
        Ok(Array2::from_shape_fn((self.n_rows, cols.len()), |(i, j)| cols[j][i]))
    }

    /// Numeric column as an owned vector
    pub fn vector(&self, name: &str) -> Result<Array1<f64>> {
        Ok(Array1::from(self.numeric(name)?.to_vec()))
    }

    /// Summary statistics for every column
    pub fn summary(&self) -> Vec<ColumnSummary> {
        self.columns
            .iter()
            .map(|col| match &col.data {
                ColumnData::Numeric(v) => {
                    let n = v.len();
                    let mean = (n > 0).then(|| v.iter().sum::<f64>() / n as f64);
                    let std = mean.filter(|_| n > 1).map(|m| {
                        (v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
                    });
                    ColumnSummary {
                        name: col.name.clone(),
                        kind: ColumnKind::Numeric,
                        count: n,
                        mean,
                        std,
                        min: v.iter().copied().reduce(f64::min),
                        max: v.iter().copied().reduce(f64::max),
                        levels: None,
                    }
                }
                ColumnData::Nominal(v) => {
                    let levels: BTreeSet<&String> = v.iter().collect();
                    ColumnSummary {
                        name: col.name.clone(),
                        kind: ColumnKind::Nominal,
                        count: v.len(),
                        mean: None,
                        std: None,
                        min: None,
                        max: None,
                        levels: Some(levels.into_iter().cloned().collect()),
                    }
                }
            })
            .collect()
    }
}
