//! XGBoost-style gradient boosting with second-order approximation
//!
//! Differences from plain gradient boosting:
//! - Splits and leaves use both gradient and hessian of the logistic loss
//! - Regularized leaf weights: w* = -G / (H + lambda), soft-thresholded by alpha
//! - Split gain: 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)], kept only above γ
//! - Children must carry at least `min_child_weight` hessian mass

use super::gradient_boosting::sample_sorted;
use crate::error::{PipelineError, Result};
use crate::training::models::{check_n_features, check_training_data, sigmoid, threshold, Model};
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// XGBoost configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: Option<u64>,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: None,
        }
    }
}

impl XGBoostConfig {
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_subsample(mut self, ratio: f64) -> Self {
        self.subsample = ratio;
        self
    }

    pub fn with_colsample_bytree(mut self, ratio: f64) -> Self {
        self.colsample_bytree = ratio;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_min_child_weight(mut self, weight: f64) -> Self {
        self.min_child_weight = weight;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        for (name, ratio) in [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(PipelineError::InvalidParameter {
                    name: name.to_string(),
                    value: ratio.to_string(),
                    reason: "must be in (0, 1]".to_string(),
                });
            }
        }
        if self.reg_lambda < 0.0 || self.gamma < 0.0 {
            return Err(PipelineError::InvalidParameter {
                name: "reg_lambda/gamma".to_string(),
                value: format!("{}/{}", self.reg_lambda, self.gamma),
                reason: "must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// A single node in a boosted tree
#[derive(Debug, Clone, Serialize, Deserialize)]
enum XGBNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        gain: f64,
        left: Box<XGBNode>,
        right: Box<XGBNode>,
    },
}

impl XGBNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                XGBNode::Leaf { weight } => return *weight,
                XGBNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => node = if sample[*feature] <= *threshold { left } else { right },
            }
        }
    }

    fn add_gains(&self, totals: &mut [f64]) {
        if let XGBNode::Split {
            feature,
            gain,
            left,
            right,
            ..
        } = self
        {
            totals[*feature] += gain;
            left.add_gains(totals);
            right.add_gains(totals);
        }
    }
}

struct TreeData<'a> {
    x: &'a Array2<f64>,
    grad: &'a Array1<f64>,
    hess: &'a Array1<f64>,
    features: &'a [usize],
    config: &'a XGBoostConfig,
}

/// Optimal leaf weight with L1 (alpha) and L2 (lambda) regularization
fn leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    let g = if g_sum > alpha {
        g_sum - alpha
    } else if g_sum < -alpha {
        g_sum + alpha
    } else {
        return 0.0;
    };
    -g / (h_sum + lambda)
}

/// Exact greedy tree growth
fn build_tree(data: &TreeData<'_>, indices: Vec<usize>, depth: usize) -> XGBNode {
    let config = data.config;
    let g_sum: f64 = indices.iter().map(|&i| data.grad[i]).sum();
    let h_sum: f64 = indices.iter().map(|&i| data.hess[i]).sum();
    let weight = leaf_weight(g_sum, h_sum, config.reg_lambda, config.reg_alpha);

    if depth >= config.max_depth || indices.len() < 2 || h_sum < 2.0 * config.min_child_weight {
        return XGBNode::Leaf { weight };
    }

    let candidates: Vec<Option<(usize, f64, f64)>> = data
        .features
        .par_iter()
        .map(|&f| best_split_for_feature(data, &indices, f, g_sum, h_sum))
        .collect();
    // First feature wins ties
    let best = candidates
        .into_iter()
        .flatten()
        .fold(None, |acc: Option<(usize, f64, f64)>, c| match acc {
            Some(b) if b.2 >= c.2 => Some(b),
            _ => Some(c),
        });

    match best {
        Some((feature, split_at, gain)) if gain > config.gamma => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| data.x[[i, feature]] <= split_at);
            XGBNode::Split {
                feature,
                threshold: split_at,
                gain,
                left: Box::new(build_tree(data, left_idx, depth + 1)),
                right: Box::new(build_tree(data, right_idx, depth + 1)),
            }
        }
        _ => XGBNode::Leaf { weight },
    }
}

fn best_split_for_feature(
    data: &TreeData<'_>,
    indices: &[usize],
    feature: usize,
    g_total: f64,
    h_total: f64,
) -> Option<(usize, f64, f64)> {
    let x = data.x;
    let lambda = data.config.reg_lambda;
    let min_child = data.config.min_child_weight;

    let mut sorted = indices.to_vec();
    sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

    let parent = g_total * g_total / (h_total + lambda);
    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<(f64, f64)> = None;

    for pos in 0..sorted.len() - 1 {
        let idx = sorted[pos];
        g_left += data.grad[idx];
        h_left += data.hess[idx];

        let here = x[[idx, feature]];
        let next = x[[sorted[pos + 1], feature]];
        if here == next {
            continue;
        }

        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < min_child || h_right < min_child {
            continue;
        }

        let gain = 0.5 * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda) - parent);
        if best.map_or(true, |(g, _)| gain > g) {
            best = Some((gain, (here + next) / 2.0));
        }
    }

    best.map(|(gain, t)| (feature, t, gain))
}

/// XGBoost classifier (logistic loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostClassifier {
    pub config: XGBoostConfig,
    trees: Vec<XGBNode>,
    base_score: f64,
    n_features: usize,
}

impl Default for XGBoostClassifier {
    fn default() -> Self {
        Self::new(XGBoostConfig::default())
    }
}

impl XGBoostClassifier {
    pub fn new(config: XGBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_score: 0.0,
            n_features: 0,
        }
    }

    fn margin_row(&self, row: ArrayView1<f64>) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|t| self.config.learning_rate * t.predict(row))
                .sum::<f64>()
    }

    /// Raw log-odds margins
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() && self.n_features == 0 {
            return Err(PipelineError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let margins: Vec<f64> = x
            .rows()
            .into_iter()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|row| self.margin_row(*row))
            .collect();
        Ok(Array1::from_vec(margins))
    }
}

impl Model for XGBoostClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        self.config.validate()?;

        let n_samples = x.nrows();
        let n_features = x.ncols();
        self.n_features = n_features;
        self.trees.clear();

        // Base score in log-odds space
        let p = y.mean().unwrap_or(0.5).clamp(1e-7, 1.0 - 1e-7);
        self.base_score = (p / (1.0 - p)).ln();
        let mut margins = Array1::from_elem(n_samples, self.base_score);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(42));

        for _ in 0..self.config.n_estimators {
            // Logistic loss: grad = p - y, hess = p * (1 - p)
            let probs = margins.mapv(sigmoid);
            let grad: Array1<f64> = &probs - y;
            let hess: Array1<f64> = probs.mapv(|p| (p * (1.0 - p)).max(1e-7));

            let rows = sample_sorted(n_samples, self.config.subsample, &mut rng);
            let cols = sample_sorted(n_features, self.config.colsample_bytree, &mut rng);

            let data = TreeData {
                x,
                grad: &grad,
                hess: &hess,
                features: &cols,
                config: &self.config,
            };
            let tree = build_tree(&data, rows, 0);

            // Every row moves, not just the subsample
            for (i, row) in x.rows().into_iter().enumerate() {
                margins[i] += self.config.learning_rate * tree.predict(row);
            }

            self.trees.push(tree);
        }

        debug!(trees = self.trees.len(), "XGBoost fitted");
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold(&self.decision_function(x)?.mapv(sigmoid)))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        Ok(Some(self.decision_function(x)?.mapv(sigmoid)))
    }

    fn has_proba(&self) -> bool {
        true
    }

    /// Total split gain per feature, normalized
    fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.n_features == 0 {
            return None;
        }
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            tree.add_gains(&mut totals);
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        Some(Array1::from_vec(totals))
    }
}
