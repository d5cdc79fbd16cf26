//! Model family tags and hyperparameter specifications

use super::gradient_boosting::GradientBoostingConfig;
use super::linear_models::LogisticConfig;
use super::neural_network::MLPConfig;
use super::random_forest::RandomForestConfig;
use super::svm::{KernelType, SVMConfig};
use super::xgboost::XGBoostConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Variant tag for every candidate the pipeline can produce.
///
/// Reports, selection and persistence dispatch on this tag rather than on
/// candidate names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LogisticRegression,
    RandomForest,
    GradientBoosting,
    #[serde(rename = "xgboost")]
    XGBoost,
    Svm,
    NeuralNetwork,
    VotingEnsemble,
    StackingEnsemble,
}

impl ModelKind {
    /// Human-readable name used in reports
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "Logistic Regression",
            ModelKind::RandomForest => "Random Forest",
            ModelKind::GradientBoosting => "Gradient Boosting",
            ModelKind::XGBoost => "XGBoost",
            ModelKind::Svm => "SVM",
            ModelKind::NeuralNetwork => "Neural Network",
            ModelKind::VotingEnsemble => "Voting Ensemble",
            ModelKind::StackingEnsemble => "Stacking Ensemble",
        }
    }

    pub fn is_ensemble(&self) -> bool {
        matches!(self, ModelKind::VotingEnsemble | ModelKind::StackingEnsemble)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A single model family together with its hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelSpec {
    LogisticRegression(LogisticConfig),
    RandomForest(RandomForestConfig),
    GradientBoosting(GradientBoostingConfig),
    #[serde(rename = "xgboost")]
    XGBoost(XGBoostConfig),
    Svm(SVMConfig),
    NeuralNetwork(MLPConfig),
}

impl ModelSpec {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSpec::LogisticRegression(_) => ModelKind::LogisticRegression,
            ModelSpec::RandomForest(_) => ModelKind::RandomForest,
            ModelSpec::GradientBoosting(_) => ModelKind::GradientBoosting,
            ModelSpec::XGBoost(_) => ModelKind::XGBoost,
            ModelSpec::Svm(_) => ModelKind::Svm,
            ModelSpec::NeuralNetwork(_) => ModelKind::NeuralNetwork,
        }
    }

    /// Whether models built from this spec expose probabilities
    pub fn has_proba(&self) -> bool {
        match self {
            ModelSpec::Svm(c) => c.probability,
            _ => true,
        }
    }

    /// Fill in `random_state` where it was left unset
    pub fn seeded(mut self, seed: u64) -> Self {
        match &mut self {
            ModelSpec::LogisticRegression(_) => {}
            ModelSpec::RandomForest(c) => {
                c.random_state.get_or_insert(seed);
            }
            ModelSpec::GradientBoosting(c) => {
                c.random_state.get_or_insert(seed);
            }
            ModelSpec::XGBoost(c) => {
                c.random_state.get_or_insert(seed);
            }
            ModelSpec::Svm(c) => {
                c.random_state.get_or_insert(seed);
            }
            ModelSpec::NeuralNetwork(c) => {
                c.random_state.get_or_insert(seed);
            }
        }
        self
    }

    /// Compact `key=value` summary of the tuned hyperparameters
    pub fn describe(&self) -> String {
        match self {
            ModelSpec::LogisticRegression(c) => {
                format!("C={}, max_iter={}", c.c, c.max_iter)
            }
            ModelSpec::RandomForest(c) => format!(
                "n_estimators={}, max_depth={}, min_samples_split={}, min_samples_leaf={}",
                c.n_estimators,
                c.max_depth.map_or_else(|| "None".to_string(), |d| d.to_string()),
                c.min_samples_split,
                c.min_samples_leaf
            ),
            ModelSpec::GradientBoosting(c) => format!(
                "n_estimators={}, learning_rate={}, max_depth={}, subsample={}",
                c.n_estimators, c.learning_rate, c.max_depth, c.subsample
            ),
            ModelSpec::XGBoost(c) => format!(
                "n_estimators={}, learning_rate={}, max_depth={}, subsample={}, colsample_bytree={}",
                c.n_estimators, c.learning_rate, c.max_depth, c.subsample, c.colsample_bytree
            ),
            ModelSpec::Svm(c) => {
                let kernel = match &c.kernel {
                    KernelType::Linear => "linear".to_string(),
                    KernelType::Polynomial { degree, .. } => format!("poly(degree={})", degree),
                    KernelType::Rbf { gamma } => format!("rbf(gamma={})", gamma),
                    KernelType::RbfScale => "rbf(gamma=scale)".to_string(),
                    KernelType::Sigmoid { .. } => "sigmoid".to_string(),
                };
                format!("C={}, kernel={}, probability={}", c.c, kernel, c.probability)
            }
            ModelSpec::NeuralNetwork(c) => format!(
                "hidden_layer_sizes={:?}, activation={:?}, alpha={}, max_iter={}",
                c.hidden_layer_sizes, c.activation, c.alpha, c.max_iter
            ),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind(), self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_json_is_tagged_by_family() {
        let spec = ModelSpec::XGBoost(XGBoostConfig::default().with_max_depth(5));
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"family\":\"xgboost\""));

        let back: ModelSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let spec: ModelSpec =
            serde_json::from_str(r#"{"family": "logistic_regression", "c": 10.0}"#).unwrap();
        match spec {
            ModelSpec::LogisticRegression(c) => {
                assert_eq!(c.c, 10.0);
                assert_eq!(c.max_iter, LogisticConfig::default().max_iter);
            }
            other => panic!("unexpected spec {:?}", other),
        }
    }

    #[test]
    fn test_seeded_keeps_explicit_seed() {
        let explicit = ModelSpec::RandomForest(RandomForestConfig::default().with_random_state(7)).seeded(42);
        let implicit = ModelSpec::RandomForest(RandomForestConfig::default()).seeded(42);
        match (explicit, implicit) {
            (ModelSpec::RandomForest(a), ModelSpec::RandomForest(b)) => {
                assert_eq!(a.random_state, Some(7));
                assert_eq!(b.random_state, Some(42));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ModelKind::XGBoost.to_string(), "XGBoost");
        assert!(ModelKind::StackingEnsemble.is_ensemble());
        assert!(!ModelSpec::Svm(SVMConfig::default()).kind().is_ensemble());
    }
}
