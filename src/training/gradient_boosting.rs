//! Gradient boosting classifier (log-loss, regression trees on residuals)

use super::decision_tree::DecisionTree;
use crate::error::{PipelineError, Result};
use crate::training::models::{check_n_features, check_training_data, sigmoid, threshold, Model};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gradient boosting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Subsample ratio for each tree
    pub subsample: f64,
    /// Column subsample ratio
    pub colsample_bytree: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: None,
        }
    }
}

impl GradientBoostingConfig {
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

    pub fn with_min_samples_split(mut self, n: usize) -> Self {
        self.min_samples_split = n;
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = n;
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

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (name, ratio) in [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(PipelineError::InvalidParameter {
                    name: name.to_string(),
                    value: ratio.to_string(),
                    reason: "must be in (0, 1]".to_string(),
                });
            }
        }
        if !(self.learning_rate > 0.0) {
            return Err(PipelineError::InvalidParameter {
                name: "learning_rate".to_string(),
                value: self.learning_rate.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Draw `ceil(n * ratio)` sorted indices without replacement
pub(crate) fn sample_sorted<R: Rng>(n: usize, ratio: f64, rng: &mut R) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let size = ((n as f64) * ratio).ceil().max(1.0) as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(size);
    indices.sort_unstable();
    indices
}

/// Binary gradient boosting classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    pub config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_log_odds: f64,
    feature_importances: Vec<f64>,
    n_features: usize,
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_log_odds: 0.0,
            feature_importances: Vec::new(),
            n_features: 0,
        }
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let mut log_odds = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for (tree, cols) in self.trees.iter().zip(&self.col_indices_per_tree) {
            let x_sub = x.select(Axis(1), cols);
            log_odds.scaled_add(self.config.learning_rate, &tree.predict_values(&x_sub)?);
        }
        Ok(log_odds)
    }
}

impl Model for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        self.config.validate()?;

        let n_samples = x.nrows();
        let n_features = x.ncols();
        self.n_features = n_features;
        self.trees.clear();
        self.col_indices_per_tree.clear();

        let p = y.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (p / (1.0 - p)).ln();
        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(42));
        self.feature_importances = vec![0.0; n_features];

        for _ in 0..self.config.n_estimators {
            // Negative gradient of log loss
            let residuals: Array1<f64> = y
                .iter()
                .zip(log_odds.iter())
                .map(|(&yi, &lo)| yi - sigmoid(lo))
                .collect();

            let rows = sample_sorted(n_samples, self.config.subsample, &mut rng);
            let cols = sample_sorted(n_features, self.config.colsample_bytree, &mut rng);
            let x_cols = x.select(Axis(1), &cols);

            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(Some(self.config.max_depth))
                .with_min_samples_split(self.config.min_samples_split)
                .with_min_samples_leaf(self.config.min_samples_leaf);
            tree.fit_rows(&x_cols, &residuals, &rows)?;

            // Every row moves, not just the subsample
            log_odds.scaled_add(self.config.learning_rate, &tree.predict_values(&x_cols)?);

            if let Some(imp) = Model::feature_importances(&tree) {
                for (j, &col) in cols.iter().enumerate() {
                    self.feature_importances[col] += imp[j];
                }
            }

            self.trees.push(tree);
            self.col_indices_per_tree.push(cols);
        }

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            self.feature_importances.iter_mut().for_each(|v| *v /= total);
        }

        debug!(trees = self.trees.len(), "Gradient boosting fitted");
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold(&self.raw_scores(x)?.mapv(sigmoid)))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        Ok(Some(self.raw_scores(x)?.mapv(sigmoid)))
    }

    fn has_proba(&self) -> bool {
        true
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.feature_importances.is_empty() {
            None
        } else {
            Some(Array1::from_vec(self.feature_importances.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| ((i * 37 + j * 11) % 29) as f64 / 29.0 - 0.5);
        let y = Array1::from_shape_fn(n, |i| (x[[i, 0]] + x[[i, 1]] > 0.0) as u8 as f64);
        (x, y)
    }

    #[test]
    fn test_gradient_boosting_learns_diagonal() {
        let (x, y) = diagonal(120);
        let mut gb = GradientBoostingClassifier::new(
            GradientBoostingConfig::default()
                .with_n_estimators(60)
                .with_subsample(0.8)
                .with_random_state(42),
        );
        gb.fit(&x, &y).unwrap();

        let pred = gb.predict(&x).unwrap();
        let acc = pred.iter().zip(y.iter()).filter(|(a, b)| a == b).count() as f64 / y.len() as f64;
        assert!(acc > 0.9, "accuracy {}", acc);

        let imp = gb.feature_importances().unwrap();
        assert!(imp[0] > imp[2] && imp[1] > imp[2]);
    }

    #[test]
    fn test_probabilities_in_range() {
        let (x, y) = diagonal(50);
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig::default().with_n_estimators(10));
        gb.fit(&x, &y).unwrap();
        let proba = gb.predict_proba(&x).unwrap().unwrap();
        assert!(proba.iter().all(|&p| p > 0.0 && p < 1.0));
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = diagonal(80);
        let fit = || {
            let mut gb = GradientBoostingClassifier::new(
                GradientBoostingConfig::default()
                    .with_n_estimators(15)
                    .with_subsample(0.7)
                    .with_colsample_bytree(0.67)
                    .with_random_state(3),
            );
            gb.fit(&x, &y).unwrap();
            gb.predict_proba(&x).unwrap().unwrap()
        };
        assert_eq!(fit(), fit());
    }

    #[test]
    fn test_invalid_subsample() {
        let (x, y) = diagonal(20);
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig::default().with_subsample(0.0));
        assert!(gb.fit(&x, &y).is_err());
    }
}
