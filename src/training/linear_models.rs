//! Logistic regression

use crate::error::{PipelineError, Result};
use crate::training::models::{check_n_features, check_training_data, sigmoid, threshold, Model};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Logistic regression hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    /// Inverse regularization strength
    pub c: f64,
    /// Maximum gradient steps
    pub max_iter: usize,
    /// Gradient-norm convergence tolerance
    pub tol: f64,
    /// Step size
    pub learning_rate: f64,
    /// Whether to fit an intercept
    pub fit_intercept: bool,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
            learning_rate: 0.1,
            fit_intercept: true,
        }
    }
}

impl LogisticConfig {
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.c > 0.0) {
            return Err(PipelineError::InvalidParameter {
                name: "C".to_string(),
                value: self.c.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !(self.learning_rate > 0.0) {
            return Err(PipelineError::InvalidParameter {
                name: "learning_rate".to_string(),
                value: self.learning_rate.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Binary logistic regression fit by full-batch gradient descent on the mean
/// log-loss with an L2 penalty of `1 / (C * n)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub config: LogisticConfig,
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Iterations actually run
    pub n_iter: usize,
    converged: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(LogisticConfig::default())
    }
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            coefficients: None,
            intercept: None,
            n_iter: 0,
            converged: false,
        }
    }

    fn decision(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        check_n_features(coefficients.len(), x)?;
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }
}

impl Model for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        self.config.validate()?;

        let n_samples = x.nrows() as f64;
        let alpha = 1.0 / (self.config.c * n_samples);
        let lr = self.config.learning_rate;

        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        self.converged = false;
        self.n_iter = self.config.max_iter;

        for iter in 0..self.config.max_iter {
            let predictions = (x.dot(&weights) + bias).mapv(sigmoid);
            let errors = &predictions - y;
            let dw = x.t().dot(&errors) / n_samples + alpha * &weights;
            let db = if self.config.fit_intercept {
                errors.mean().unwrap_or(0.0)
            } else {
                0.0
            };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if !grad_norm.is_finite() {
                return Err(PipelineError::TrainingError(
                    "logistic regression diverged".to_string(),
                ));
            }
            if grad_norm < self.config.tol {
                self.converged = true;
                self.n_iter = iter;
                break;
            }

            weights.scaled_add(-lr, &dw);
            bias -= lr * db;
        }

        if self.converged {
            debug!(iterations = self.n_iter, "Logistic regression converged");
        } else {
            warn!(
                max_iter = self.config.max_iter,
                "Logistic regression did not converge"
            );
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.decision(x)?.mapv(sigmoid);
        Ok(threshold(&proba))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        Ok(Some(self.decision(x)?.mapv(sigmoid)))
    }

    fn has_proba(&self) -> bool {
        true
    }

    /// Absolute coefficients
    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.coefficients.as_ref().map(|c| c.mapv(f64::abs))
    }

    fn converged(&self) -> bool {
        self.converged
    }
}
