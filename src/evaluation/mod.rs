//! Held-out evaluation of trained candidates

mod metrics;

pub use metrics::{ConfusionMatrix, Metric, RocCurve};

use crate::error::Result;
use crate::training::{Model, ModelKind};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Metrics for one candidate on the test split. All values lie in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub model_id: String,
    pub kind: ModelKind,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Absent when the model has no probability output or the test labels
    /// hold a single class
    pub auc: Option<f64>,
    /// False when an iterative solver stopped at its iteration cap
    pub converged: bool,
    /// How the fit deviated from a plain run, e.g. subsampling
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub n_samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roc: Option<RocCurve>,
}

impl MetricsRecord {
    /// Value of `metric`, `None` only for a missing AUC
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Accuracy => Some(self.accuracy),
            Metric::Precision => Some(self.precision),
            Metric::Recall => Some(self.recall),
            Metric::F1 => Some(self.f1),
            Metric::Auc => self.auc,
        }
    }

    /// Caveats worth surfacing next to this row in reports
    pub fn caveats(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if !self.converged {
            notes.push("did not converge within its iteration budget".to_string());
        }
        if self.auc.is_none() {
            notes.push("AUC unavailable".to_string());
        }
        notes.extend(self.notes.iter().cloned());
        notes
    }
}

/// Computes [`MetricsRecord`]s against held-out data
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate<M: Model + ?Sized>(
        &self,
        model_id: &str,
        kind: ModelKind,
        model: &M,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<MetricsRecord> {
        let y_pred = model.predict(x_test)?;
        let cm = ConfusionMatrix::from_labels(y_test, &y_pred)?;

        let roc = match model.predict_proba(x_test)? {
            Some(proba) => {
                let roc = RocCurve::compute(y_test, &proba)?;
                if roc.is_none() {
                    warn!(model = model_id, "Test labels hold a single class; AUC is undefined");
                }
                roc
            }
            None => {
                debug!(model = model_id, "No probability output; AUC not computed");
                None
            }
        };

        let record = MetricsRecord {
            model_id: model_id.to_string(),
            kind,
            accuracy: cm.accuracy(),
            precision: cm.precision(),
            recall: cm.recall(),
            f1: cm.f1(),
            auc: roc.as_ref().map(RocCurve::auc),
            converged: model.converged(),
            notes: model.training_notes(),
            n_samples: y_test.len(),
            roc,
        };

        info!(
            model = model_id,
            accuracy = record.accuracy,
            precision = record.precision,
            recall = record.recall,
            f1 = record.f1,
            auc = ?record.auc,
            "Evaluated"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{ModelSpec, ModelTrainer, SVMConfig};
    use crate::training::linear_models::LogisticConfig;
    use ndarray::array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[-2.0], [-1.5], [-1.0], [-0.5], [0.5], [1.0], [1.5], [2.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_evaluate_probabilistic_model() {
        let (x, y) = data();
        let model = ModelTrainer::new(ModelSpec::LogisticRegression(LogisticConfig::default()))
            .fit(&x, &y)
            .unwrap();
        let record = Evaluator::new()
            .evaluate("lr", ModelKind::LogisticRegression, &model, &x, &y)
            .unwrap();

        assert_eq!(record.accuracy, 1.0);
        assert_eq!(record.f1, 1.0);
        assert_eq!(record.auc, Some(1.0));
        assert!(record.roc.is_some());
        assert_eq!(record.value(Metric::Auc), Some(1.0));
    }

    #[test]
    fn test_label_only_model_has_absent_auc() {
        let (x, y) = data();
        let model = ModelTrainer::new(ModelSpec::Svm(
            SVMConfig::default().with_probability(false),
        ))
        .fit(&x, &y)
        .unwrap();
        let record = Evaluator::new()
            .evaluate("svm", ModelKind::Svm, &model, &x, &y)
            .unwrap();

        assert_eq!(record.auc, None);
        assert_eq!(record.value(Metric::Auc), None);
        assert!(record.caveats().iter().any(|c| c.contains("AUC")));
        for v in [record.accuracy, record.precision, record.recall, record.f1] {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_subsampled_fit_is_a_caveat() {
        let (x, y) = data();
        let model = ModelTrainer::new(ModelSpec::Svm(SVMConfig::default().with_max_samples(4)))
            .fit(&x, &y)
            .unwrap();
        let record = Evaluator::new()
            .evaluate("svm", ModelKind::Svm, &model, &x, &y)
            .unwrap();

        assert_eq!(record.notes.len(), 1);
        assert!(record.caveats().iter().any(|c| c.contains("subsample of 4 of 8 rows")));
    }

    #[test]
    fn test_single_class_test_split_has_absent_auc() {
        let (x, y) = data();
        let model = ModelTrainer::new(ModelSpec::LogisticRegression(LogisticConfig::default()))
            .fit(&x, &y)
            .unwrap();
        let x_neg = array![[-2.0], [-1.0]];
        let y_neg = array![0.0, 0.0];
        let record = Evaluator::new()
            .evaluate("lr", ModelKind::LogisticRegression, &model, &x_neg, &y_neg)
            .unwrap();
        assert_eq!(record.auc, None);
        assert_eq!(record.accuracy, 1.0);
    }
}
