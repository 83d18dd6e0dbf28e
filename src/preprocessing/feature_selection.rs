//! Unsupervised column filters
//!
//! Both filters decide which columns to drop from training statistics only;
//! the decision is stored and replayed on any other table.

use crate::data::{ColumnData, Table};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Set of columns removed by a fitted filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrop {
    columns: Vec<String>,
}

impl ColumnDrop {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn apply(&self, table: &Table) -> Result<Table> {
        Ok(table.clone().without_columns(&self.columns))
    }
}

/// Near-zero-variance filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NzvFilter {
    /// Ratio of most common to second most common value above which a column is suspect
    pub freq_cut: f64,
    /// Maximum percentage of distinct values for a suspect column to be dropped
    pub unique_cut: f64,
}

impl Default for NzvFilter {
    fn default() -> Self {
        Self {
            freq_cut: 95.0 / 5.0,
            unique_cut: 10.0,
        }
    }
}

impl NzvFilter {
    pub fn new(freq_cut: f64, unique_cut: f64) -> Self {
        Self {
            freq_cut,
            unique_cut,
        }
    }

    /// Columns among `columns` with near-zero variance in `table`
    pub fn fit(&self, table: &Table, columns: &[String]) -> Result<ColumnDrop> {
        let mut dropped = Vec::new();

        for name in columns {
            let counts = value_counts(table.column(name)?.data());
            let n: usize = counts.iter().sum();
            if n == 0 {
                continue;
            }

            let near_zero = match counts.as_slice() {
                [_] => true,
                [first, second, ..] => {
                    let freq_ratio = *first as f64 / *second as f64;
                    let percent_unique = 100.0 * counts.len() as f64 / n as f64;
                    freq_ratio > self.freq_cut && percent_unique <= self.unique_cut
                }
                [] => false,
            };

            if near_zero {
                tracing::debug!(column = %name, "Dropping near-zero-variance column");
                dropped.push(name.clone());
            }
        }

        Ok(ColumnDrop::new(dropped))
    }
}

/// Value frequencies in descending order
fn value_counts(data: &ColumnData) -> Vec<usize> {
    let mut counts: Vec<usize> = match data {
        ColumnData::Numeric(values) => {
            let mut map: HashMap<u64, usize> = HashMap::new();
            for v in values {
                // Collapse -0.0 onto 0.0
                let key = if *v == 0.0 { 0u64 } else { v.to_bits() };
                *map.entry(key).or_default() += 1;
            }
            map.into_values().collect()
        }
        ColumnData::Nominal(values) => {
            let mut map: HashMap<&str, usize> = HashMap::new();
            for v in values {
                *map.entry(v.as_str()).or_default() += 1;
            }
            map.into_values().collect()
        }
    };
    counts.sort_unstable_by(|a, b| b.cmp(a));
    counts
}

/// Remove highly correlated features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationFilter {
    threshold: f64,
}

impl Default for CorrelationFilter {
    fn default() -> Self {
        Self::new(0.9)
    }
}

impl CorrelationFilter {
    /// Create a new correlation filter
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Greedily drop columns until no remaining pair exceeds the threshold.
    ///
    /// Each round takes the most correlated remaining pair and removes the
    /// member with the larger mean absolute correlation to the other
    /// remaining columns (the later column on ties).
    pub fn fit(&self, table: &Table, columns: &[String]) -> Result<ColumnDrop> {
        let data = columns
            .iter()
            .map(|name| table.numeric(name))
            .collect::<Result<Vec<_>>>()?;
        let p = data.len();

        let mut corr = vec![vec![0.0; p]; p];
        for i in 0..p {
            corr[i][i] = 1.0;
            for j in (i + 1)..p {
                let r = pearson_correlation(data[i], data[j]).abs();
                corr[i][j] = r;
                corr[j][i] = r;
            }
        }

        let mut removed: HashSet<usize> = HashSet::new();
        loop {
            let mut worst: Option<(usize, usize, f64)> = None;
            for i in (0..p).filter(|i| !removed.contains(i)) {
                for j in ((i + 1)..p).filter(|j| !removed.contains(j)) {
                    let r = corr[i][j];
                    if r > self.threshold && worst.map_or(true, |(_, _, best)| r > best) {
                        worst = Some((i, j, r));
                    }
                }
            }

            let Some((i, j, r)) = worst else { break };
            let mean_i = mean_correlation(&corr, i, &removed);
            let mean_j = mean_correlation(&corr, j, &removed);
            let drop = if mean_i > mean_j { i } else { j };

            tracing::debug!(
                a = %columns[i],
                b = %columns[j],
                r,
                dropped = %columns[drop],
                "Correlated pair"
            );
            removed.insert(drop);
        }

        Ok(ColumnDrop::new(
            (0..p)
                .filter(|i| removed.contains(i))
                .map(|i| columns[i].clone())
                .collect(),
        ))
    }
}

fn mean_correlation(corr: &[Vec<f64>], idx: usize, exclude: &HashSet<usize>) -> f64 {
    let others: Vec<f64> = (0..corr.len())
        .filter(|&j| j != idx && !exclude.contains(&j))
        .map(|j| corr[idx][j])
        .collect();
    if others.is_empty() {
        0.0
    } else {
        others.iter().sum::<f64>() / others.len() as f64
    }
}

/// Pearson correlation; zero when either side has no variance
pub(crate) fn pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }

    let x_mean = x[..n].iter().sum::<f64>() / n as f64;
    let y_mean = y[..n].iter().sum::<f64>() / n as f64;

    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    let mut sum_y2 = 0.0;

    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        sum_xy += dx * dy;
        sum_x2 += dx * dx;
        sum_y2 += dy * dy;
    }

    let denom = (sum_x2 * sum_y2).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        sum_xy / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_nzv_drops_constant_and_rare() {
        let mut rare = vec![0.0; 100];
        rare[3] = 1.0;
        let varied: Vec<f64> = (0..100).map(|i| i as f64).collect();

        let table = Table::new(vec![
            Column::numeric("constant", vec![1.0; 100]),
            Column::numeric("rare", rare),
            Column::numeric("varied", varied),
        ])
        .unwrap();

        let drop = NzvFilter::default()
            .fit(&table, &names(&["constant", "rare", "varied"]))
            .unwrap();
        assert_eq!(drop.columns(), &names(&["constant", "rare"])[..]);

        let out = drop.apply(&table).unwrap();
        assert_eq!(out.column_names(), vec!["varied"]);
    }

    #[test]
    fn test_nzv_keeps_balanced_binary() {
        let binary: Vec<f64> = (0..100).map(|i| (i % 2) as f64).collect();
        let table = Table::new(vec![Column::numeric("workingday", binary)]).unwrap();
        let drop = NzvFilter::default().fit(&table, &names(&["workingday"])).unwrap();
        assert!(drop.columns().is_empty());
    }

    #[test]
    fn test_correlation_filter_drops_one_of_pair() {
        let temp: Vec<f64> = (0..50).map(|i| i as f64 / 50.0).collect();
        let atemp: Vec<f64> = temp.iter().map(|t| 0.9 * t + 0.01).collect();
        let hum: Vec<f64> = (0..50).map(|i| ((i * 37) % 50) as f64).collect();

        let table = Table::new(vec![
            Column::numeric("temp", temp),
            Column::numeric("atemp", atemp),
            Column::numeric("hum", hum),
        ])
        .unwrap();

        let drop = CorrelationFilter::new(0.9)
            .fit(&table, &names(&["temp", "atemp", "hum"]))
            .unwrap();
        assert_eq!(drop.columns().len(), 1);
        assert!(drop.columns()[0] == "temp" || drop.columns()[0] == "atemp");
    }

    #[test]
    fn test_pearson_correlation() {
        assert!((pearson_correlation(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
        assert!((pearson_correlation(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert_eq!(pearson_correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
    }
}
