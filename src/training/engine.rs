//! Uniform training front-end over every model family

use super::config::{ModelKind, ModelSpec};
use super::gradient_boosting::GradientBoostingClassifier;
use super::linear_models::LogisticRegression;
use super::models::Model;
use super::neural_network::MLPClassifier;
use super::random_forest::RandomForest;
use super::svm::SVMClassifier;
use super::xgboost::XGBoostClassifier;
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Enum to hold trained model variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", content = "model", rename_all = "snake_case")]
pub enum TrainedModel {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoostingClassifier),
    #[serde(rename = "xgboost")]
    XGBoost(XGBoostClassifier),
    Svm(SVMClassifier),
    NeuralNetwork(MLPClassifier),
}

impl TrainedModel {
    /// Unfitted model for a spec
    fn untrained(spec: &ModelSpec) -> Self {
        match spec {
            ModelSpec::LogisticRegression(c) => TrainedModel::LogisticRegression(LogisticRegression::new(c.clone())),
            ModelSpec::RandomForest(c) => TrainedModel::RandomForest(RandomForest::new(c.clone())),
            ModelSpec::GradientBoosting(c) => {
                TrainedModel::GradientBoosting(GradientBoostingClassifier::new(c.clone()))
            }
            ModelSpec::XGBoost(c) => TrainedModel::XGBoost(XGBoostClassifier::new(c.clone())),
            ModelSpec::Svm(c) => TrainedModel::Svm(SVMClassifier::new(c.clone())),
            ModelSpec::NeuralNetwork(c) => TrainedModel::NeuralNetwork(MLPClassifier::new(c.clone())),
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.spec().kind()
    }

    /// Hyperparameters this model was built with
    pub fn spec(&self) -> ModelSpec {
        match self {
            TrainedModel::LogisticRegression(m) => ModelSpec::LogisticRegression(m.config.clone()),
            TrainedModel::RandomForest(m) => ModelSpec::RandomForest(m.config.clone()),
            TrainedModel::GradientBoosting(m) => ModelSpec::GradientBoosting(m.config.clone()),
            TrainedModel::XGBoost(m) => ModelSpec::XGBoost(m.config.clone()),
            TrainedModel::Svm(m) => ModelSpec::Svm(m.config.clone()),
            TrainedModel::NeuralNetwork(m) => ModelSpec::NeuralNetwork(m.config.clone()),
        }
    }

    fn inner(&self) -> &dyn Model {
        match self {
            TrainedModel::LogisticRegression(m) => m,
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::XGBoost(m) => m,
            TrainedModel::Svm(m) => m,
            TrainedModel::NeuralNetwork(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Model {
        match self {
            TrainedModel::LogisticRegression(m) => m,
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::XGBoost(m) => m,
            TrainedModel::Svm(m) => m,
            TrainedModel::NeuralNetwork(m) => m,
        }
    }
}

impl Model for TrainedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        self.inner().predict_proba(x)
    }

    fn has_proba(&self) -> bool {
        self.inner().has_proba()
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.inner().feature_importances()
    }

    fn converged(&self) -> bool {
        self.inner().converged()
    }

    fn training_notes(&self) -> Vec<String> {
        self.inner().training_notes()
    }
}

/// Fits one model family from its spec
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    spec: ModelSpec,
}

impl ModelTrainer {
    pub fn new(spec: ModelSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Train a fresh model. Non-convergence is logged and carried on the
    /// returned model; it is not an error.
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<TrainedModel> {
        let start = Instant::now();
        let mut model = TrainedModel::untrained(&self.spec);
        model.fit(x, y)?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        if model.converged() {
            info!(model = %self.spec.kind(), rows = x.nrows(), elapsed_ms, "Model trained");
        } else {
            warn!(
                model = %self.spec.kind(),
                rows = x.nrows(),
                elapsed_ms,
                "Model trained without converging"
            );
        }
        Ok(model)
    }

    /// Train quietly; used inside cross-validation loops
    pub(crate) fn fit_silent(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<TrainedModel> {
        let mut model = TrainedModel::untrained(&self.spec);
        model.fit(x, y)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::linear_models::LogisticConfig;
    use crate::training::neural_network::MLPConfig;
    use crate::training::random_forest::RandomForestConfig;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [-2.0, -1.0],
            [-1.5, -2.0],
            [-1.0, -1.5],
            [-2.5, -0.5],
            [1.0, 2.0],
            [2.0, 1.5],
            [1.5, 1.0],
            [2.5, 2.0]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_trainer_dispatches_on_spec() {
        let (x, y) = separable();
        let model = ModelTrainer::new(ModelSpec::RandomForest(
            RandomForestConfig::default().with_n_estimators(5).with_random_state(1),
        ))
        .fit(&x, &y)
        .unwrap();

        assert_eq!(model.kind(), ModelKind::RandomForest);
        assert!(model.has_proba());
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_trained_model_round_trips_through_json() {
        let (x, y) = separable();
        let model = ModelTrainer::new(ModelSpec::LogisticRegression(LogisticConfig::default()))
            .fit(&x, &y)
            .unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: TrainedModel = serde_json::from_str(&json).unwrap();
        assert_eq!(
            restored.predict_proba(&x).unwrap(),
            model.predict_proba(&x).unwrap()
        );
        assert_eq!(restored.spec(), model.spec());
    }

    #[test]
    fn test_non_convergence_is_not_an_error() {
        let (x, y) = separable();
        let model = ModelTrainer::new(ModelSpec::NeuralNetwork(
            MLPConfig::default().with_hidden_layers(vec![4]).with_max_iter(1),
        ))
        .fit(&x, &y)
        .unwrap();
        assert!(!model.converged());
    }
}
