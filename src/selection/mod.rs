//! Candidate bookkeeping and champion selection

use crate::ensemble::{StackingClassifier, VotingClassifier};
use crate::error::{PipelineError, PipelineStage, Result};
use crate::evaluation::{Metric, MetricsRecord};
use crate::training::{Model, ModelKind, SearchResult, TrainedModel};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

/// Any trained model the pipeline can evaluate, select and persist
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "model", rename_all = "snake_case")]
pub enum CandidateModel {
    Single(Arc<TrainedModel>),
    Voting(VotingClassifier),
    Stacking(StackingClassifier),
}

impl CandidateModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            CandidateModel::Single(m) => m.kind(),
            CandidateModel::Voting(_) => ModelKind::VotingEnsemble,
            CandidateModel::Stacking(_) => ModelKind::StackingEnsemble,
        }
    }

    fn inner(&self) -> &dyn Model {
        match self {
            CandidateModel::Single(m) => m.as_ref(),
            CandidateModel::Voting(m) => m,
            CandidateModel::Stacking(m) => m,
        }
    }
}

impl Model for CandidateModel {
    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        Err(PipelineError::TrainingError(
            "candidates are trained before they are wrapped".to_string(),
        ))
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

/// A trained, evaluated candidate
#[derive(Debug, Clone)]
pub struct ModelCandidate {
    pub id: String,
    pub kind: ModelKind,
    /// Summary of the hyperparameters the model was trained with
    pub hyperparameters: String,
    pub model: CandidateModel,
    pub metrics: MetricsRecord,
    /// Grid search that chose the hyperparameters, when one ran
    pub search: Option<SearchResult>,
}

/// A configured candidate that produced no model. The run continues without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub id: String,
    pub stage: Option<PipelineStage>,
    pub reason: String,
}

impl CandidateFailure {
    pub fn new(id: impl Into<String>, err: &PipelineError) -> Self {
        let reason = match err {
            PipelineError::StageFailed { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        Self {
            id: id.into(),
            stage: err.stage(),
            reason,
        }
    }
}

/// The chosen champion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub index: usize,
    pub metric: Metric,
    pub score: f64,
}

/// Picks the candidate that maximizes one metric
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSelector {
    metric: Metric,
}

impl ModelSelector {
    pub fn new(metric: Metric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Highest score wins; ties keep the lowest index. Candidates without a
    /// value for the metric (AUC on label-only models) cannot win.
    pub fn select(&self, metrics: &[MetricsRecord]) -> Result<Selection> {
        let mut best: Option<Selection> = None;
        for (index, record) in metrics.iter().enumerate() {
            let Some(score) = record.value(self.metric) else {
                continue;
            };
            if best.map_or(true, |b| score > b.score) {
                best = Some(Selection {
                    index,
                    metric: self.metric,
                    score,
                });
            }
        }

        let selection = best.ok_or_else(|| {
            PipelineError::ValidationError(format!(
                "no candidate has a value for metric '{}'",
                self.metric
            ))
        })?;
        info!(
            champion = %metrics[selection.index].model_id,
            metric = %self.metric,
            score = selection.score,
            "Champion selected"
        );
        Ok(selection)
    }

    /// Candidate indices ordered best first; ties keep training order and
    /// missing values go last
    pub fn rank(&self, metrics: &[MetricsRecord]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..metrics.len()).collect();
        order.sort_by(|&a, &b| {
            match (metrics[a].value(self.metric), metrics[b].value(self.metric)) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
        order
    }
}
