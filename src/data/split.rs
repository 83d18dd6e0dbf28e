//! Stratified train/test splitting

use super::table::{ColumnData, Table};
use crate::error::{Result, VelotuneError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for the initial train/test split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of rows assigned to the training subset
    pub prop: f64,
    /// Column whose categories are kept proportional in both subsets
    pub strata: Option<String>,
    /// Number of quantile bins used when the strata column is numeric
    pub breaks: usize,
    /// Random seed
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            prop: 0.75,
            strata: None,
            breaks: 4,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn new(prop: f64) -> Self {
        Self {
            prop,
            ..Default::default()
        }
    }

    pub fn with_strata(mut self, column: impl Into<String>) -> Self {
        self.strata = Some(column.into());
        self
    }

    pub fn with_breaks(mut self, breaks: usize) -> Self {
        self.breaks = breaks;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Disjoint train/test row indices into the source table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    train: Vec<usize>,
    test: Vec<usize>,
}

impl Split {
    pub fn train_indices(&self) -> &[usize] {
        &self.train
    }

    pub fn test_indices(&self) -> &[usize] {
        &self.test
    }

    /// Training rows of `table`
    pub fn training(&self, table: &Table) -> Result<Table> {
        table.take(&self.train)
    }

    /// Test rows of `table`
    pub fn testing(&self, table: &Table) -> Result<Table> {
        table.take(&self.test)
    }
}

/// Stratum label for every row of `table`.
///
/// Nominal columns use their values directly. Numeric columns are cut into
/// `breaks` quantile bins.
pub fn strata_keys(table: &Table, column: &str, breaks: usize) -> Result<Vec<String>> {
    match table.column(column)?.data() {
        ColumnData::Nominal(values) => Ok(values.clone()),
        ColumnData::Numeric(values) => {
            let cuts = quantile_cuts(values, breaks);
            Ok(values
                .iter()
                .map(|v| {
                    let bin = cuts.iter().take_while(|&&c| *v > c).count();
                    format!("q{}", bin)
                })
                .collect())
        }
    }
}

/// Interior quantile cut points (linear interpolation), de-duplicated
fn quantile_cuts(values: &[f64], breaks: usize) -> Vec<f64> {
    if values.is_empty() || breaks < 2 {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let last = (sorted.len() - 1) as f64;

    let mut cuts: Vec<f64> = (1..breaks)
        .map(|k| {
            let pos = last * k as f64 / breaks as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        })
        .collect();
    cuts.dedup();
    cuts
}

/// Split `table` into train and test subsets.
///
/// The training subset gets `floor(prop * n)` rows. With a strata column,
/// the training rows are apportioned across strata by largest remainder, so
/// each stratum's training share is within one row of its proportional value.
pub fn initial_split(table: &Table, config: &SplitConfig) -> Result<Split> {
    let prop = config.prop;
    if !(prop > 0.0 && prop < 1.0) {
        return Err(VelotuneError::InvalidFraction(prop));
    }

    let keys = match &config.strata {
        Some(column) => Some(strata_keys(table, column, config.breaks)?),
        None => None,
    };

    let n = table.n_rows();
    if n < 2 {
        return Err(VelotuneError::DataError(format!(
            "need at least 2 rows to split, got {}",
            n
        )));
    }

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for row in 0..n {
        let key = keys.as_ref().map(|k| k[row].as_str()).unwrap_or("");
        groups.entry(key).or_default().push(row);
    }

    let n_train = ((prop * n as f64).floor() as usize).clamp(1, n - 1);
    let quotas = apportion(n_train, n, groups.values().map(Vec::len));

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n - n_train);

    for (rows, quota) in groups.values().zip(quotas) {
        let mut shuffled = rows.clone();
        shuffled.shuffle(&mut rng);
        train.extend_from_slice(&shuffled[..quota]);
        test.extend_from_slice(&shuffled[quota..]);
    }

    train.sort_unstable();
    test.sort_unstable();

    tracing::info!(
        rows = n,
        train = train.len(),
        test = test.len(),
        strata = groups.len(),
        "Created initial split"
    );

    Ok(Split { train, test })
}

/// Largest-remainder apportionment of `total` seats over groups of the given sizes
fn apportion(total: usize, n: usize, sizes: impl Iterator<Item = usize>) -> Vec<usize> {
    let sizes: Vec<usize> = sizes.collect();
    let mut quotas: Vec<usize> = sizes.iter().map(|&s| total * s / n).collect();
    let assigned: usize = quotas.iter().sum();

    let mut by_remainder: Vec<usize> = (0..sizes.len()).collect();
    // Stable sort keeps stratum order among equal remainders
    by_remainder.sort_by_key(|&g| std::cmp::Reverse(total * sizes[g] % n));

    for &g in by_remainder.iter().take(total - assigned) {
        quotas[g] += 1;
    }
    quotas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Column;
    use std::collections::HashSet;

    fn table_with_strata(n: usize) -> Table {
        let season: Vec<String> = (0..n).map(|i| ((i % 4) + 1).to_string()).collect();
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Table::new(vec![
            Column::nominal("season", season),
            Column::numeric("cnt", values),
        ])
        .unwrap()
    }

    #[test]
    fn test_invalid_fraction() {
        let table = table_with_strata(10);
        for p in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let result = initial_split(&table, &SplitConfig::new(p));
            assert!(matches!(result, Err(VelotuneError::InvalidFraction(_))));
        }
    }

    #[test]
    fn test_unknown_strata_column() {
        let table = table_with_strata(10);
        let result = initial_split(&table, &SplitConfig::new(0.7).with_strata("nope"));
        assert!(matches!(result, Err(VelotuneError::UnknownColumn(_))));
    }

    #[test]
    fn test_partition_is_disjoint_and_exhaustive() {
        let table = table_with_strata(731);
        let split = initial_split(&table, &SplitConfig::new(0.7).with_strata("season")).unwrap();

        assert_eq!(split.train_indices().len(), 511);
        assert_eq!(split.test_indices().len(), 220);

        let train: HashSet<usize> = split.train_indices().iter().copied().collect();
        let test: HashSet<usize> = split.test_indices().iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), 731);
    }

    #[test]
    fn test_strata_proportions_preserved() {
        let table = table_with_strata(731);
        let split = initial_split(&table, &SplitConfig::new(0.7).with_strata("season")).unwrap();
        let season = table.nominal("season").unwrap();
        let p_eff = 511.0 / 731.0;

        for level in ["1", "2", "3", "4"] {
            let total = season.iter().filter(|s| *s == level).count() as f64;
            let in_train = split
                .train_indices()
                .iter()
                .filter(|&&i| season[i] == level)
                .count() as f64;
            assert!((in_train - p_eff * total).abs() < 1.0, "level {} off by >= 1 row", level);
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let table = table_with_strata(100);
        let config = SplitConfig::new(0.7).with_strata("season").with_seed(7);
        let a = initial_split(&table, &config).unwrap();
        let b = initial_split(&table, &config).unwrap();
        assert_eq!(a, b);

        let c = initial_split(&table, &config.clone().with_seed(8)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_numeric_strata_bins() {
        let table = table_with_strata(100);
        let keys = strata_keys(&table, "cnt", 4).unwrap();
        let distinct: HashSet<&String> = keys.iter().collect();
        assert_eq!(distinct.len(), 4);
        assert_eq!(keys.iter().filter(|k| *k == "q0").count(), 25);
    }

    #[test]
    fn test_apportion_sums_to_total() {
        let quotas = apportion(7, 10, vec![3, 3, 4].into_iter());
        assert_eq!(quotas.iter().sum::<usize>(), 7);
        for (q, s) in quotas.iter().zip([3usize, 3, 4]) {
            assert!((*q as f64 - 0.7 * s as f64).abs() < 1.0);
        }
    }
}
