//! Readmission AutoML - hospital readmission risk modelling
//!
//! This crate trains, compares and persists binary classifiers that predict
//! whether a patient encounter ends in readmission:
//! - Feature scaling fit on the training split only
//! - SMOTE oversampling of the minority class
//! - Six classifier families with cross-validated grid search
//! - Voting and stacking ensembles
//! - Metric-driven champion selection and atomic artifact persistence
//!
//! # Modules
//!
//! ## Core
//! - [`data`] - Feature table loading, splitting and synthetic tables
//! - [`preprocessing`] - Standard scaling
//! - [`synthetic`] - Minority oversampling (SMOTE)
//! - [`training`] - Classifier families, trainer and hyperparameter search
//! - [`calibration`] - Platt scaling for SVM probabilities
//! - [`evaluation`] - Test-set metrics
//! - [`ensemble`] - Voting and stacking ensembles
//! - [`selection`] - Champion selection
//!
//! ## Orchestration and I/O
//! - [`pipeline`] - Run configuration and the end-to-end pipeline
//! - [`export`] - Artifact directory and reports
//! - [`inference`] - Prediction with a persisted champion
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core ML modules
pub mod data;
pub mod preprocessing;
pub mod synthetic;
pub mod training;
pub mod calibration;
pub mod evaluation;
pub mod ensemble;
pub mod selection;

// Orchestration and I/O
pub mod pipeline;
pub mod export;
pub mod inference;
pub mod cli;

pub use error::{PipelineError, PipelineStage, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, PipelineStage, Result, StageContext};

    // Data
    pub use crate::data::{default_features, synthetic_table, FeatureTable, DEFAULT_FEATURES, DEFAULT_LABEL};

    // Preprocessing
    pub use crate::preprocessing::{FeatureScaler, ScalingParameters};

    // Oversampling
    pub use crate::synthetic::{Sampler, SMOTE};

    // Training
    pub use crate::training::{GridSearch, Model, ModelKind, ModelSpec, ModelTrainer, TrainedModel};

    // Evaluation and selection
    pub use crate::evaluation::{Evaluator, Metric, MetricsRecord};
    pub use crate::selection::{CandidateFailure, CandidateModel, ModelSelector};

    // Ensembles
    pub use crate::ensemble::{EnsembleBuilder, StackingClassifier, VotingClassifier, VotingStrategy};

    // Pipeline
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineReport, Profile};

    // Artifacts and inference
    pub use crate::export::{ArtifactStore, RunManifest};
    pub use crate::inference::{ClassificationResult, Predictor};
}
