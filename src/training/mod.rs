//! Model training module
//!
//! Provides the classifier families used by the pipeline:
//! - Logistic regression
//! - Random forests over CART trees
//! - Gradient boosting and XGBoost-style second-order boosting
//! - Support vector machines with Platt-calibrated probabilities
//! - Neural networks (MLP)
//!
//! plus stratified cross-validation and grid search over [`ModelSpec`]s.

mod config;
mod engine;
pub(crate) mod models;
pub mod cross_validation;
pub mod linear_models;
pub mod decision_tree;
pub mod random_forest;
pub mod gradient_boosting;
pub mod neural_network;
pub mod svm;
pub mod xgboost;
pub mod search;

pub use config::{ModelKind, ModelSpec};
pub use engine::{ModelTrainer, TrainedModel};
pub use models::Model;
pub use cross_validation::{CrossValidator, CVStrategy, CVSplit, CVResults};
pub use linear_models::{LogisticConfig, LogisticRegression};
pub use decision_tree::{DecisionTree, TreeNode, Criterion};
pub use random_forest::{RandomForest, RandomForestConfig, MaxFeatures};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use neural_network::{MLPClassifier, MLPConfig, Activation};
pub use svm::{SVMClassifier, SVMConfig, KernelType};
pub use xgboost::{XGBoostClassifier, XGBoostConfig};
pub use search::{GridSearch, GridEntryResult, SearchResult};
