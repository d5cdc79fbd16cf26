//! Cross-validated grid search over model specs

use super::config::ModelSpec;
use super::cross_validation::{CVResults, CrossValidator};
use super::engine::ModelTrainer;
use super::models::Model;
use crate::error::{PipelineError, Result};
use crate::evaluation::Metric;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Score of one grid entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridEntryResult {
    pub spec: ModelSpec,
    pub cv: CVResults,
}

/// Outcome of a grid search. `entries` keeps grid order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub metric: Metric,
    pub best_index: usize,
    pub entries: Vec<GridEntryResult>,
}

impl SearchResult {
    pub fn best_spec(&self) -> &ModelSpec {
        &self.entries[self.best_index].spec
    }

    pub fn best_score(&self) -> f64 {
        self.entries[self.best_index].cv.mean_score
    }
}

/// Exhaustive search with stratified k-fold cross-validation
#[derive(Debug, Clone)]
pub struct GridSearch {
    n_splits: usize,
    metric: Metric,
    seed: u64,
}

impl Default for GridSearch {
    fn default() -> Self {
        Self {
            n_splits: 5,
            metric: Metric::F1,
            seed: 42,
        }
    }
}

struct Fold {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
}

impl GridSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_splits(mut self, n_splits: usize) -> Self {
        self.n_splits = n_splits;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Score every spec and pick the highest mean CV score. Ties keep the
    /// earliest entry in grid order.
    pub fn search(&self, grid: &[ModelSpec], x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult> {
        if grid.is_empty() {
            return Err(PipelineError::ConfigError(
                "hyperparameter grid is empty".to_string(),
            ));
        }

        let splits = CrossValidator::stratified(self.n_splits, self.seed).split(y)?;
        let folds: Vec<Fold> = splits
            .iter()
            .map(|split| Fold {
                x_train: x.select(Axis(0), &split.train_indices),
                y_train: y.select(Axis(0), &split.train_indices),
                x_test: x.select(Axis(0), &split.test_indices),
                y_test: y.select(Axis(0), &split.test_indices),
            })
            .collect();

        info!(
            family = %grid[0].kind(),
            combinations = grid.len(),
            folds = folds.len(),
            metric = %self.metric,
            "Starting grid search"
        );

        let metric = self.metric;
        let entries: Vec<GridEntryResult> = grid
            .par_iter()
            .map(|spec| {
                let trainer = ModelTrainer::new(spec.clone());
                let scores = folds
                    .iter()
                    .map(|fold| score_fold(&trainer, fold, metric))
                    .collect::<Result<Vec<f64>>>()?;
                let cv = CVResults::from_scores(scores);
                debug!(spec = %spec, mean = cv.mean_score, std = cv.std_score, "Grid entry scored");
                Ok(GridEntryResult { spec: spec.clone(), cv })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut best_index = 0;
        for (i, entry) in entries.iter().enumerate().skip(1) {
            if entry.cv.mean_score > entries[best_index].cv.mean_score {
                best_index = i;
            }
        }

        let result = SearchResult {
            metric,
            best_index,
            entries,
        };
        info!(
            best = %result.best_spec(),
            score = result.best_score(),
            "Grid search finished"
        );
        Ok(result)
    }
}

fn score_fold(trainer: &ModelTrainer, fold: &Fold, metric: Metric) -> Result<f64> {
    let model = trainer.fit_silent(&fold.x_train, &fold.y_train)?;
    let y_pred = model.predict(&fold.x_test)?;
    let proba = if metric == Metric::Auc {
        model.predict_proba(&fold.x_test)?
    } else {
        None
    };
    // A fold without a defined AUC counts as the worst score
    Ok(metric.score(&fold.y_test, &y_pred, proba.as_ref())?.unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::linear_models::LogisticConfig;
    use crate::training::random_forest::RandomForestConfig;

    fn noisy(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| ((i * 13 + j * 7) % 17) as f64 / 17.0 - 0.5);
        let y = Array1::from_shape_fn(n, |i| (x[[i, 0]] > 0.1) as u8 as f64);
        (x, y)
    }

    #[test]
    fn test_search_reports_every_entry_in_order() {
        let (x, y) = noisy(100);
        let grid = vec![
            ModelSpec::LogisticRegression(LogisticConfig::default().with_c(0.01)),
            ModelSpec::LogisticRegression(LogisticConfig::default().with_c(10.0)),
        ];
        let result = GridSearch::new().search(&grid, &x, &y).unwrap();

        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[0].spec, grid[0]);
        assert_eq!(result.entries[1].spec, grid[1]);
        assert!(result.entries.iter().all(|e| e.cv.n_folds == 5));
        assert!(result.best_score() >= result.entries[0].cv.mean_score);
    }

    #[test]
    fn test_ties_keep_first_entry() {
        let (x, y) = noisy(60);
        let spec = ModelSpec::RandomForest(
            RandomForestConfig::default().with_n_estimators(5).with_random_state(3),
        );
        let grid = vec![spec.clone(), spec.clone(), spec];
        let result = GridSearch::new().search(&grid, &x, &y).unwrap();
        assert_eq!(result.best_index, 0);
    }

    #[test]
    fn test_search_is_reproducible() {
        let (x, y) = noisy(80);
        let grid = vec![
            ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(4)),
            ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(4).with_max_depth(Some(2))),
        ];
        let a = GridSearch::new().with_seed(1).search(&grid, &x, &y).unwrap();
        let b = GridSearch::new().with_seed(1).search(&grid, &x, &y).unwrap();
        let scores = |r: &SearchResult| r.entries.iter().map(|e| e.cv.scores.clone()).collect::<Vec<_>>();
        assert_eq!(scores(&a), scores(&b));
        assert_eq!(a.best_index, b.best_index);
    }

    #[test]
    fn test_empty_grid_rejected() {
        let (x, y) = noisy(20);
        assert!(GridSearch::new().search(&[], &x, &y).is_err());
    }
}
