//! CART decision tree used by the forest and boosting models

use crate::error::{PipelineError, Result};
use crate::training::models::{check_n_features, check_training_data, threshold, Model};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node; `value` is the mean target of its samples, which for 0/1
    /// labels is the positive fraction
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression on residuals)
    Mse,
}

impl Criterion {
    /// Impurity of a node from its count, target sum and squared-target sum
    fn impurity(self, count: usize, sum: f64, sq_sum: f64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let n = count as f64;
        match self {
            Criterion::Gini => {
                let p = sum / n;
                2.0 * p * (1.0 - p)
            }
            Criterion::Entropy => {
                let p = sum / n;
                let term = |q: f64| if q > 0.0 { -q * q.ln() } else { 0.0 };
                term(p) + term(1.0 - p)
            }
            Criterion::Mse => (sq_sum / n - (sum / n).powi(2)).max(0.0),
        }
    }
}

/// Running statistics of one side of a split
#[derive(Debug, Clone, Copy, Default)]
struct SideStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
}

impl SideStats {
    fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sq_sum += v * v;
    }

    fn minus(self, other: SideStats) -> SideStats {
        SideStats {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sq_sum: self.sq_sum - other.sq_sum,
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn at random per split (`None` uses all)
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for the per-split feature draw
    pub random_state: Option<u64>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

struct BuildContext<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    rng: ChaCha8Rng,
    importances: Vec<f64>,
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self::with_criterion_internal(Criterion::Gini)
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self::with_criterion_internal(Criterion::Mse)
    }

    fn with_criterion_internal(criterion: Criterion) -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion,
            random_state: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit on the rows listed in `indices` (repeats allowed, for bootstraps)
    pub fn fit_rows(&mut self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if indices.is_empty() {
            return Err(PipelineError::TrainingError(
                "cannot grow a tree on zero rows".to_string(),
            ));
        }

        self.n_features = x.ncols();
        let mut ctx = BuildContext {
            x,
            y,
            rng: ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0)),
            importances: vec![0.0; x.ncols()],
        };

        let root = self.build(&mut ctx, indices.to_vec(), 0);

        let total: f64 = ctx.importances.iter().sum();
        if total > 0.0 {
            ctx.importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = Some(Array1::from_vec(ctx.importances));
        self.root = Some(root);
        Ok(())
    }

    fn build(&self, ctx: &mut BuildContext<'_>, indices: Vec<usize>, depth: usize) -> TreeNode {
        let mut stats = SideStats::default();
        for &i in &indices {
            stats.push(ctx.y[i]);
        }
        let n_samples = indices.len();
        let value = stats.sum / n_samples as f64;
        let impurity = self.criterion.impurity(stats.count, stats.sum, stats.sq_sum);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;
        if should_stop {
            return TreeNode::Leaf { value, n_samples };
        }

        let candidates = self.candidate_features(ctx);
        let Some((feature_idx, split_at, gain)) = self.best_split(ctx, &indices, &candidates, stats, impurity)
        else {
            return TreeNode::Leaf { value, n_samples };
        };

        ctx.importances[feature_idx] += n_samples as f64 * gain;

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| ctx.x[[i, feature_idx]] <= split_at);

        let left = Box::new(self.build(ctx, left_idx, depth + 1));
        let right = Box::new(self.build(ctx, right_idx, depth + 1));

        TreeNode::Split {
            feature_idx,
            threshold: split_at,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    fn candidate_features(&self, ctx: &mut BuildContext<'_>) -> Vec<usize> {
        let n = self.n_features;
        match self.max_features {
            Some(k) if k < n => {
                let mut picked = sample(&mut ctx.rng, n, k.max(1)).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n).collect(),
        }
    }

    /// Best (feature, threshold, gain); ties keep the lowest feature index
    fn best_split(
        &self,
        ctx: &BuildContext<'_>,
        indices: &[usize],
        features: &[usize],
        total: SideStats,
        parent_impurity: f64,
    ) -> Option<(usize, f64, f64)> {
        let x = ctx.x;
        let y = ctx.y;
        let n = indices.len() as f64;
        let min_leaf = self.min_samples_leaf;
        let criterion = self.criterion;

        let per_feature: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&f| {
                let mut order: Vec<usize> = indices.to_vec();
                order.sort_by(|&a, &b| x[[a, f]].total_cmp(&x[[b, f]]));

                let mut left = SideStats::default();
                let mut best: Option<(f64, f64)> = None;
                for pos in 0..order.len() - 1 {
                    left.push(y[order[pos]]);
                    let here = x[[order[pos], f]];
                    let next = x[[order[pos + 1], f]];
                    if here == next || left.count < min_leaf || order.len() - left.count < min_leaf {
                        continue;
                    }
                    let right = total.minus(left);
                    let weighted = (left.count as f64 * criterion.impurity(left.count, left.sum, left.sq_sum)
                        + right.count as f64 * criterion.impurity(right.count, right.sum, right.sq_sum))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > 1e-12 && best.map_or(true, |(g, _)| gain > g) {
                        best = Some((gain, (here + next) / 2.0));
                    }
                }
                best.map(|(gain, t)| (f, t, gain))
            })
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(best) if best.2 >= cand.2 => Some(best),
                _ => Some(cand),
            })
    }

    /// Raw leaf values (positive fraction for classifiers, mean for regressors)
    pub fn predict_values(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        check_n_features(self.n_features, x)?;
        Ok(x.rows().into_iter().map(|row| root.predict_row(row)).collect())
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }
}

impl Model for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if self.criterion != Criterion::Mse {
            check_training_data(x, y)?;
        }
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.fit_rows(x, y, &indices)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold(&self.predict_values(x)?))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        self.predict_values(x).map(Some)
    }

    fn has_proba(&self) -> bool {
        self.criterion != Criterion::Mse
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }
}
