//! Regression tree used as the boosting base learner

use crate::error::{Result, VelotuneError};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        gain: f64,
    },
}

/// Best split found for a node
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Least-squares regression tree
///
/// Leaf values are `sum / (count + l2)`; with `l2 = 0` this is the plain mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: usize,
    /// Minimum samples a node needs to be split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf values
    pub l2: f64,
    /// Number of features
    n_features: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: 6,
            min_samples_split: 2,
            min_samples_leaf: 1,
            l2: 0.0,
            n_features: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_l2(mut self, l2: f64) -> Self {
        self.l2 = l2;
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(VelotuneError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(VelotuneError::FitFailure("no training rows".to_string()));
        }

        self.n_features = x.ncols();
        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, indices, 0));
        Ok(self)
    }

    fn leaf_value(&self, sum: f64, count: usize) -> f64 {
        sum / (count as f64 + self.l2)
    }

    fn build_tree(&self, x: &Array2<f64>, y: &Array1<f64>, indices: Vec<usize>, depth: usize) -> TreeNode {
        let n_samples = indices.len();
        let sum: f64 = indices.iter().map(|&i| y[i]).sum();

        let should_stop = depth >= self.max_depth
            || n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf;

        let best = if should_stop {
            None
        } else {
            self.find_best_split(x, y, &indices, sum)
        };

        match best {
            Some(split) => {
                let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                    .into_iter()
                    .partition(|&i| x[[i, split.feature_idx]] <= split.threshold);

                let left = Box::new(self.build_tree(x, y, left_indices, depth + 1));
                let right = Box::new(self.build_tree(x, y, right_indices, depth + 1));

                TreeNode::Split {
                    feature_idx: split.feature_idx,
                    threshold: split.threshold,
                    left,
                    right,
                    n_samples,
                    gain: split.gain,
                }
            }
            None => TreeNode::Leaf {
                value: self.leaf_value(sum, n_samples),
                n_samples,
            },
        }
    }

    /// Scan every feature in sorted order, keeping running sums on the left side
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        total_sum: f64,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let lambda = self.l2;
        let parent_score = total_sum * total_sum / (n as f64 + lambda);

        let feature_results: Vec<Option<SplitCandidate>> = (0..x.ncols())
            .into_par_iter()
            .map(|feature_idx| {
                let mut order: Vec<(f64, f64)> =
                    indices.iter().map(|&i| (x[[i, feature_idx]], y[i])).collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut best: Option<SplitCandidate> = None;
                let mut left_sum = 0.0;

                for k in 0..n - 1 {
                    left_sum += order[k].1;
                    let left_count = k + 1;
                    let right_count = n - left_count;

                    if order[k].0 == order[k + 1].0 {
                        continue;
                    }
                    if left_count < self.min_samples_leaf || right_count < self.min_samples_leaf {
                        continue;
                    }

                    let right_sum = total_sum - left_sum;
                    let gain = left_sum * left_sum / (left_count as f64 + lambda)
                        + right_sum * right_sum / (right_count as f64 + lambda)
                        - parent_score;

                    if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                        best = Some(SplitCandidate {
                            feature_idx,
                            threshold: (order[k].0 + order[k + 1].0) / 2.0,
                            gain,
                        });
                    }
                }
                best
            })
            .collect();

        // Earliest feature wins ties
        feature_results
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<SplitCandidate>, cand| match acc {
                Some(a) if a.gain >= cand.gain => Some(a),
                _ => Some(cand),
            })
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(VelotuneError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(VelotuneError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut node = root;
                loop {
                    match node {
                        TreeNode::Leaf { value, .. } => break *value,
                        TreeNode::Split {
                            feature_idx,
                            threshold,
                            left,
                            right,
                            ..
                        } => {
                            node = if row[*feature_idx] <= *threshold { &**left } else { &**right };
                        }
                    }
                }
            })
            .collect())
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map_or(0, node_depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        fn count_leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => count_leaves(left) + count_leaves(right),
            }
        }
        self.root.as_ref().map_or(0, count_leaves)
    }
}
