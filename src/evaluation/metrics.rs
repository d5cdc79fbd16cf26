//! Binary classification metrics and ROC analysis

use crate::error::{PipelineError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Confusion counts with respect to the positive class (label 1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t > 0.5, p > 0.5) {
                (true, true) => cm.tp += 1,
                (false, true) => cm.fp += 1,
                (false, false) => cm.tn += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.tp + self.tn) as f64 / total as f64
        }
    }

    /// Precision; 0 when nothing was predicted positive
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall; 0 when there are no actual positives
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// Harmonic mean of precision and recall, 0 when both are 0
    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Receiver operating characteristic curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    /// Sweep every distinct score as a threshold, highest first.
    ///
    /// Returns `None` when `y_true` holds a single class, since one of the
    /// two rates is then undefined.
    pub fn compute(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<Option<Self>> {
        if y_true.len() != scores.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} scores", y_true.len()),
                actual: format!("{} scores", scores.len()),
            });
        }
        let n_pos = y_true.iter().filter(|&&t| t > 0.5).count();
        let n_neg = y_true.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Ok(None);
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let mut fpr = vec![0.0];
        let mut tpr = vec![0.0];
        let mut thresholds = vec![f64::INFINITY];
        let (mut tp, mut fp) = (0usize, 0usize);

        for (pos, &i) in order.iter().enumerate() {
            if y_true[i] > 0.5 {
                tp += 1;
            } else {
                fp += 1;
            }
            // Emit a point only after the last row sharing this score
            let tied_with_next = order
                .get(pos + 1)
                .map_or(false, |&next| scores[next] == scores[i]);
            if !tied_with_next {
                fpr.push(fp as f64 / n_neg as f64);
                tpr.push(tp as f64 / n_pos as f64);
                thresholds.push(scores[i]);
            }
        }

        Ok(Some(Self { fpr, tpr, thresholds }))
    }

    /// Trapezoidal area under the curve
    pub fn auc(&self) -> f64 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(f, t)| (f[1] - f[0]) * (t[1] + t[0]) / 2.0)
            .sum()
    }
}

/// Metric used to rank candidates or score cross-validation folds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    Precision,
    Recall,
    #[default]
    F1,
    Auc,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Accuracy,
        Metric::Precision,
        Metric::Recall,
        Metric::F1,
        Metric::Auc,
    ];

    /// Score predictions. `None` only for AUC without usable probabilities.
    pub fn score(
        &self,
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        proba: Option<&Array1<f64>>,
    ) -> Result<Option<f64>> {
        let cm = ConfusionMatrix::from_labels(y_true, y_pred)?;
        Ok(match self {
            Metric::Accuracy => Some(cm.accuracy()),
            Metric::Precision => Some(cm.precision()),
            Metric::Recall => Some(cm.recall()),
            Metric::F1 => Some(cm.f1()),
            Metric::Auc => match proba {
                Some(p) => RocCurve::compute(y_true, p)?.map(|roc| roc.auc()),
                None => None,
            },
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::Precision => "precision",
            Metric::Recall => "recall",
            Metric::F1 => "f1",
            Metric::Auc => "auc",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "accuracy" => Ok(Metric::Accuracy),
            "precision" => Ok(Metric::Precision),
            "recall" => Ok(Metric::Recall),
            "f1" | "f1_score" => Ok(Metric::F1),
            "auc" | "roc_auc" => Ok(Metric::Auc),
            other => Err(PipelineError::ConfigError(format!(
                "unknown metric '{}'; expected one of accuracy, precision, recall, f1, auc",
                other
            ))),
        }
    }
}
