//! Error types for the readmission pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Stages of a pipeline run, used to report where a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Load,
    Split,
    Scale,
    Resample,
    Search,
    Train,
    Evaluate,
    Ensemble,
    Select,
    Persist,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Load => "load",
            PipelineStage::Split => "split",
            PipelineStage::Scale => "scale",
            PipelineStage::Resample => "resample",
            PipelineStage::Search => "hyperparameter search",
            PipelineStage::Train => "train",
            PipelineStage::Evaluate => "evaluate",
            PipelineStage::Ensemble => "ensemble",
            PipelineStage::Select => "select",
            PipelineStage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Feature column '{0}' is not numeric")]
    NonNumericFeature(String),

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature mismatch: expected [{expected}], got [{actual}]")]
    FeatureMismatch { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Artifact error at {path}: {reason}")]
    ArtifactError { path: String, reason: String },

    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: PipelineStage,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Stage that produced this error, if it was tagged with one
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PipelineError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

/// Attach the failing stage to an error
pub trait StageContext<T> {
    fn in_stage(self, stage: PipelineStage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn in_stage(self, stage: PipelineStage) -> Result<T> {
        self.map_err(|err| match err {
            // Keep the innermost stage
            already @ PipelineError::StageFailed { .. } => already,
            other => PipelineError::StageFailed {
                stage,
                source: Box::new(other),
            },
        })
    }
}
