//! Classifier contract shared by every model family

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};

/// Trait for binary classifiers.
///
/// Labels are `0.0`/`1.0`. Probabilities, when a model supports them, are the
/// positive-class probability per row.
pub trait Model: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict class labels
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Positive-class probabilities, or `None` for label-only models
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        Ok(None)
    }

    /// Whether `predict_proba` returns scores
    fn has_proba(&self) -> bool {
        false
    }

    /// Get feature importances (if available)
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }

    /// False when an iterative solver hit its iteration cap
    fn converged(&self) -> bool {
        true
    }

    /// Notes about how the fit ran that belong next to its metrics
    fn training_notes(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Shape and label checks shared by every `fit`
pub(crate) fn check_training_data(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(PipelineError::TrainingError(
            "cannot fit on an empty matrix".to_string(),
        ));
    }
    if y.iter().any(|&v| v != 0.0 && v != 1.0) {
        return Err(PipelineError::InvalidLabel(
            "training labels must be 0 or 1".to_string(),
        ));
    }
    Ok(())
}

/// Reject prediction input whose width differs from the training width
pub(crate) fn check_n_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(PipelineError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Threshold probabilities at 0.5 (strictly greater is positive)
pub(crate) fn threshold(proba: &Array1<f64>) -> Array1<f64> {
    proba.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 })
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_check_training_data() {
        assert!(check_training_data(&array![[1.0], [2.0]], &array![0.0, 1.0]).is_ok());
        assert!(check_training_data(&array![[1.0], [2.0]], &array![0.0]).is_err());
        assert!(matches!(
            check_training_data(&array![[1.0]], &array![3.0]),
            Err(PipelineError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_threshold_is_strict() {
        assert_eq!(threshold(&array![0.5, 0.51, 0.1]), array![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(800.0) <= 1.0);
    }
}
