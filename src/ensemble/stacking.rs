//! Stacking ensemble method

use crate::error::{PipelineError, Result};
use crate::evaluation::ConfusionMatrix;
use crate::training::{CrossValidator, Model, ModelSpec, ModelTrainer, TrainedModel};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration for stacking ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackingConfig {
    /// Number of cross-validation folds used to build meta-features
    pub n_folds: usize,
    /// Seed for the fold assignment; the pipeline fills in its run seed when unset
    pub seed: Option<u64>,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self { n_folds: 5, seed: None }
    }
}

/// A base learner owned by the stacking ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingBase {
    pub name: String,
    pub spec: ModelSpec,
}

/// Stacking classifier.
///
/// Base learners are built from specs and only ever trained inside the
/// ensemble's own folds. Each training row's meta-feature comes from the
/// fold model that did not see it. At inference the fold models of each base
/// are averaged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingClassifier {
    config: StackingConfig,
    bases: Vec<StackingBase>,
    meta_spec: ModelSpec,
    /// Fitted base models, one per fold per base learner
    fold_models: Vec<Vec<TrainedModel>>,
    meta_learner: Option<TrainedModel>,
    meta_train_accuracy: Option<f64>,
}

impl StackingClassifier {
    pub fn new(bases: Vec<StackingBase>, meta_spec: ModelSpec, config: StackingConfig) -> Self {
        Self {
            config,
            bases,
            meta_spec,
            fold_models: Vec::new(),
            meta_learner: None,
            meta_train_accuracy: None,
        }
    }

    pub fn base_names(&self) -> Vec<&str> {
        self.bases.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn config(&self) -> &StackingConfig {
        &self.config
    }

    pub fn meta_spec(&self) -> &ModelSpec {
        &self.meta_spec
    }

    /// Meta-learner accuracy on its own out-of-fold training matrix
    pub fn meta_train_accuracy(&self) -> Option<f64> {
        self.meta_train_accuracy
    }

    fn meta_features(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.fold_models.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        let mut meta = Array2::<f64>::zeros((x.nrows(), self.fold_models.len()));
        for (j, models) in self.fold_models.iter().enumerate() {
            let mut sum = Array1::<f64>::zeros(x.nrows());
            for model in models {
                sum += &base_output(model, x)?;
            }
            meta.column_mut(j).assign(&(sum / models.len() as f64));
        }
        Ok(meta)
    }

    fn meta(&self) -> Result<&TrainedModel> {
        self.meta_learner.as_ref().ok_or(PipelineError::ModelNotFitted)
    }
}

/// Positive-class probability, or the hard label for label-only models
fn base_output(model: &TrainedModel, x: &Array2<f64>) -> Result<Array1<f64>> {
    match model.predict_proba(x)? {
        Some(proba) => Ok(proba),
        None => model.predict(x),
    }
}

impl Model for StackingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if self.bases.is_empty() {
            return Err(PipelineError::ValidationError(
                "stacking ensemble needs at least one base learner".to_string(),
            ));
        }

        let n_samples = x.nrows();
        let splits = CrossValidator::stratified(self.config.n_folds, self.config.seed.unwrap_or(42)).split(y)?;

        // Each base learner runs its own fold loop
        let per_base: Vec<(Array1<f64>, Vec<TrainedModel>)> = self
            .bases
            .par_iter()
            .map(|base| {
                let trainer = ModelTrainer::new(base.spec.clone());
                let mut column = Array1::<f64>::zeros(n_samples);
                let mut models = Vec::with_capacity(splits.len());

                for split in &splits {
                    let x_train = x.select(Axis(0), &split.train_indices);
                    let y_train = y.select(Axis(0), &split.train_indices);
                    let model = trainer.fit_silent(&x_train, &y_train)?;

                    let held_out = base_output(&model, &x.select(Axis(0), &split.test_indices))?;
                    for (local, &row) in split.test_indices.iter().enumerate() {
                        column[row] = held_out[local];
                    }
                    models.push(model);
                }
                Ok((column, models))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut meta_x = Array2::<f64>::zeros((n_samples, self.bases.len()));
        let mut fold_models = Vec::with_capacity(self.bases.len());
        for (j, (column, models)) in per_base.into_iter().enumerate() {
            meta_x.column_mut(j).assign(&column);
            fold_models.push(models);
        }

        let meta = ModelTrainer::new(self.meta_spec.clone()).fit(&meta_x, y)?;
        let train_accuracy = ConfusionMatrix::from_labels(y, &meta.predict(&meta_x)?)?.accuracy();

        self.fold_models = fold_models;
        self.meta_learner = Some(meta);
        self.meta_train_accuracy = Some(train_accuracy);

        if !self.converged() {
            warn!("Stacking ensemble contains a model that did not converge");
        }
        info!(
            bases = ?self.base_names(),
            folds = splits.len(),
            meta = %self.meta_spec.kind(),
            meta_train_accuracy = train_accuracy,
            "Stacking ensemble fitted"
        );
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let meta = self.meta()?;
        meta.predict(&self.meta_features(x)?)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        let meta = self.meta()?;
        meta.predict_proba(&self.meta_features(x)?)
    }

    fn has_proba(&self) -> bool {
        match &self.meta_learner {
            Some(meta) => meta.has_proba(),
            None => self.meta_spec.has_proba(),
        }
    }

    fn converged(&self) -> bool {
        self.fold_models.iter().flatten().all(|m| m.converged())
            && self.meta_learner.as_ref().map_or(true, |m| m.converged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{LogisticConfig, RandomForestConfig, SVMConfig};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn blobs(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| {
            let centre = if i % 2 == 0 { -1.5 } else { 1.5 };
            let jitter = ((i * 29 + j * 11) % 17) as f64 / 17.0 - 0.5;
            if j == 0 { centre + jitter } else { jitter }
        });
        let y = Array1::from_shape_fn(n, |i| (i % 2) as f64);
        (x, y)
    }

    fn bases() -> Vec<StackingBase> {
        vec![
            StackingBase {
                name: "rf".to_string(),
                spec: ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(10).with_random_state(1)),
            },
            StackingBase {
                name: "lr".to_string(),
                spec: ModelSpec::LogisticRegression(LogisticConfig::default()),
            },
        ]
    }

    #[test]
    fn test_stacking_fits_and_predicts() {
        let (x, y) = blobs(60);
        let mut stack = StackingClassifier::new(
            bases(),
            ModelSpec::LogisticRegression(LogisticConfig::default()),
            StackingConfig::default(),
        );
        stack.fit(&x, &y).unwrap();

        assert_eq!(stack.fold_models.len(), 2);
        assert!(stack.fold_models.iter().all(|m| m.len() == 5));
        assert_eq!(stack.predict(&x).unwrap(), y);
        let proba = stack.predict_proba(&x).unwrap().unwrap();
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_meta_learner_does_not_memorize_noise() {
        // Labels carry no signal; deep forests memorize their training rows,
        // so only out-of-fold meta-features keep the meta-learner honest.
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let n = 200;
        let x = Array2::from_shape_fn((n, 4), |_| rng.gen_range(-1.0..1.0));
        let y = Array1::from_shape_fn(n, |_| if rng.gen_bool(0.5) { 1.0 } else { 0.0 });

        let mut stack = StackingClassifier::new(
            vec![StackingBase {
                name: "rf".to_string(),
                spec: ModelSpec::RandomForest(
                    RandomForestConfig::default().with_n_estimators(20).with_random_state(3),
                ),
            }],
            ModelSpec::LogisticRegression(LogisticConfig::default()),
            StackingConfig::default(),
        );
        stack.fit(&x, &y).unwrap();

        let acc = stack.meta_train_accuracy().unwrap();
        assert!(acc < 0.8, "meta-learner training accuracy {} suggests leakage", acc);
    }

    #[test]
    fn test_label_only_base_feeds_hard_labels() {
        let (x, y) = blobs(40);
        let mut stack = StackingClassifier::new(
            vec![StackingBase {
                name: "svm".to_string(),
                spec: ModelSpec::Svm(SVMConfig::default().with_probability(false)),
            }],
            ModelSpec::LogisticRegression(LogisticConfig::default()),
            StackingConfig::default(),
        );
        stack.fit(&x, &y).unwrap();
        let meta = stack.meta_features(&x).unwrap();
        assert!(meta.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_unfitted_and_empty() {
        let (x, y) = blobs(10);
        let unfitted = StackingClassifier::new(
            bases(),
            ModelSpec::LogisticRegression(LogisticConfig::default()),
            StackingConfig::default(),
        );
        assert!(matches!(unfitted.predict(&x), Err(PipelineError::ModelNotFitted)));

        let mut empty = StackingClassifier::new(
            Vec::new(),
            ModelSpec::LogisticRegression(LogisticConfig::default()),
            StackingConfig::default(),
        );
        assert!(empty.fit(&x, &y).is_err());
    }
}
