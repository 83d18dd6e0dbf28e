//! V-fold cross-validation with repeats and strata

use crate::error::{Result, VelotuneError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one fold of one repeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FoldId {
    pub repeat: usize,
    pub fold: usize,
}

impl fmt::Display for FoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Repeat{}/Fold{}", self.repeat + 1, self.fold + 1)
    }
}

/// A single analysis/assessment split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub id: FoldId,
    /// Rows used for fitting
    pub analysis: Vec<usize>,
    /// Held-out rows used for scoring
    pub assessment: Vec<usize>,
}

/// All folds of a resampling run, in (repeat, fold) order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resamples {
    folds: Vec<Fold>,
    n_rows: usize,
    v: usize,
    repeats: usize,
}

impl Resamples {
    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    /// Rows in the resampled table
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn v(&self) -> usize {
        self.v
    }

    pub fn repeats(&self) -> usize {
        self.repeats
    }
}

/// Cross-validation splitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidator {
    v: usize,
    repeats: usize,
    random_state: u64,
    strata: Option<Vec<String>>,
}

impl CrossValidator {
    /// Create a new cross-validator with `v` folds
    pub fn new(v: usize) -> Self {
        Self {
            v,
            repeats: 1,
            random_state: 42,
            strata: None,
        }
    }

    pub fn with_repeats(mut self, repeats: usize) -> Self {
        self.repeats = repeats;
        self
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Stratum label per row; rows of each stratum are spread evenly over the folds
    pub fn with_strata(mut self, keys: Vec<String>) -> Self {
        self.strata = Some(keys);
        self
    }

    /// Generate the folds for a table of `n_rows` rows
    pub fn split(&self, n_rows: usize) -> Result<Resamples> {
        if self.v < 2 || self.v > n_rows {
            return Err(VelotuneError::InvalidFoldCount {
                folds: self.v,
                rows: n_rows,
            });
        }
        if self.repeats == 0 {
            return Err(VelotuneError::ConfigError(
                "repeats must be at least 1".to_string(),
            ));
        }
        if let Some(keys) = &self.strata {
            if keys.len() != n_rows {
                return Err(VelotuneError::ShapeError {
                    expected: format!("{} strata keys", n_rows),
                    actual: keys.len().to_string(),
                });
            }
        }

        let groups: Vec<Vec<usize>> = match &self.strata {
            Some(keys) => {
                let mut map: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
                for (row, key) in keys.iter().enumerate() {
                    map.entry(key.as_str()).or_default().push(row);
                }
                map.into_values().collect()
            }
            None => vec![(0..n_rows).collect()],
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut folds = Vec::with_capacity(self.v * self.repeats);

        for repeat in 0..self.repeats {
            let mut order = Vec::with_capacity(n_rows);
            for group in &groups {
                let mut rows = group.clone();
                rows.shuffle(&mut rng);
                order.extend(rows);
            }

            // Deal rows round-robin so fold sizes differ by at most one
            let mut assignment = vec![0usize; n_rows];
            for (position, &row) in order.iter().enumerate() {
                assignment[row] = position % self.v;
            }

            for fold in 0..self.v {
                let (assessment, analysis): (Vec<usize>, Vec<usize>) =
                    (0..n_rows).partition(|&row| assignment[row] == fold);
                folds.push(Fold {
                    id: FoldId { repeat, fold },
                    analysis,
                    assessment,
                });
            }
        }

        tracing::info!(
            folds = self.v,
            repeats = self.repeats,
            rows = n_rows,
            stratified = self.strata.is_some(),
            "Generated resamples"
        );

        Ok(Resamples {
            folds,
            n_rows,
            v: self.v,
            repeats: self.repeats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_invalid_fold_count() {
        for v in [0, 1, 11] {
            assert!(matches!(
                CrossValidator::new(v).split(10),
                Err(VelotuneError::InvalidFoldCount { .. })
            ));
        }
    }

    #[test]
    fn test_folds_partition_rows() {
        let resamples = CrossValidator::new(5).split(511).unwrap();
        assert_eq!(resamples.len(), 5);

        let mut seen = HashSet::new();
        for fold in resamples.folds() {
            let size = fold.assessment.len();
            assert!(size == 102 || size == 103);
            assert_eq!(fold.analysis.len() + size, 511);
            for &row in &fold.assessment {
                assert!(seen.insert(row), "row {} in two folds", row);
            }
        }
        assert_eq!(seen.len(), 511);
    }

    #[test]
    fn test_repeats_differ_and_are_seeded() {
        let cv = CrossValidator::new(3).with_repeats(2).with_random_state(9);
        let a = cv.split(30).unwrap();
        let b = cv.split(30).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
        assert_eq!(a.folds()[3].id, FoldId { repeat: 1, fold: 0 });
        assert_ne!(a.folds()[0].assessment, a.folds()[3].assessment);
    }

    #[test]
    fn test_stratified_folds_balance_strata() {
        let keys: Vec<String> = (0..40).map(|i| if i < 20 { "a" } else { "b" }.to_string()).collect();
        let resamples = CrossValidator::new(4).with_strata(keys.clone()).split(40).unwrap();
        for fold in resamples.folds() {
            let a = fold.assessment.iter().filter(|&&r| keys[r] == "a").count();
            assert_eq!(a, 5);
            assert_eq!(fold.assessment.len(), 10);
        }
    }
}
