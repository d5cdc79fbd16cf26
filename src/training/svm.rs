//! Support Vector Machine classifier
//!
//! Binary C-SVC trained with SMO (Sequential Minimal Optimization) over a
//! precomputed kernel matrix, with optional Platt-scaled probabilities.

use crate::calibration::{Calibrator, PlattScaling};
use crate::error::{PipelineError, Result};
use crate::training::models::{check_n_features, check_training_data, Model};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default row budget for the eager kernel matrix (200 MB at 5k rows)
const DEFAULT_MAX_SAMPLES: usize = 5_000;

/// Consecutive sweeps without an update before SMO stops
const STABLE_PASSES: usize = 5;

/// Kernel function type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelType {
    /// Linear kernel: K(x, y) = x · y
    Linear,
    /// Polynomial kernel: K(x, y) = (γ * x · y + r)^d
    Polynomial { degree: u32, gamma: f64, coef0: f64 },
    /// Radial Basis Function (Gaussian): K(x, y) = exp(-γ * ||x - y||²)
    Rbf { gamma: f64 },
    /// RBF with γ = 1 / (n_features * Var(X)) computed at fit time
    RbfScale,
    /// Sigmoid kernel: K(x, y) = tanh(γ * x · y + r)
    Sigmoid { gamma: f64, coef0: f64 },
}

impl Default for KernelType {
    fn default() -> Self {
        KernelType::RbfScale
    }
}

impl KernelType {
    /// Replace data-dependent parameters with concrete values
    fn resolve(&self, x: &Array2<f64>) -> KernelType {
        match self {
            KernelType::RbfScale => {
                let var = x.var(0.0);
                let gamma = if var > 0.0 {
                    1.0 / (x.ncols() as f64 * var)
                } else {
                    1.0
                };
                KernelType::Rbf { gamma }
            }
            other => other.clone(),
        }
    }

    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial { degree, gamma, coef0 } => {
                (gamma * a.dot(&b) + coef0).powi(*degree as i32)
            }
            KernelType::Rbf { gamma } => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q).powi(2)).sum();
                (-gamma * sq).exp()
            }
            // Resolved before use; fall back to unit gamma
            KernelType::RbfScale => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q).powi(2)).sum();
                (-sq).exp()
            }
            KernelType::Sigmoid { gamma, coef0 } => (gamma * a.dot(&b) + coef0).tanh(),
        }
    }
}

/// SVM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Kernel function
    pub kernel: KernelType,
    /// KKT tolerance
    pub tol: f64,
    /// Maximum number of full SMO sweeps
    pub max_iter: usize,
    /// Fit Platt scaling so the model exposes probabilities
    pub probability: bool,
    /// Random seed for the second-multiplier choice and subsampling
    pub random_state: Option<u64>,
    /// Training sets larger than this are fit on a seeded stratified subsample
    pub max_samples: usize,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::RbfScale,
            tol: 1e-3,
            max_iter: 1000,
            probability: true,
            random_state: None,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

impl SVMConfig {
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelType) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_probability(mut self, probability: bool) -> Self {
        self.probability = probability;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }
}

/// Row indices of a class-proportional sample of at most `budget` rows.
/// Both classes keep at least one row. Indices come back sorted.
fn stratified_subsample(y: &Array1<f64>, budget: usize, seed: u64) -> Vec<usize> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let n = y.len();
    let mut picked = Vec::with_capacity(budget);

    for label in [0.0, 1.0] {
        let mut rows: Vec<usize> = (0..n).filter(|&i| y[i] == label).collect();
        if rows.is_empty() {
            continue;
        }
        let share = ((budget as f64 * rows.len() as f64 / n as f64).round() as usize).clamp(1, rows.len());
        rows.shuffle(&mut rng);
        picked.extend_from_slice(&rows[..share]);
    }

    picked.sort_unstable();
    picked
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    pub config: SVMConfig,
    /// Kernel with data-dependent parameters fixed at fit time
    kernel: Option<KernelType>,
    support_vectors: Option<Array2<f64>>,
    /// `alpha_i * y_i` per support vector
    dual_coef: Option<Array1<f64>>,
    bias: f64,
    platt: Option<PlattScaling>,
    converged: bool,
    /// (rows used, rows given) when the fit ran on a subsample
    #[serde(default)]
    subsampled: Option<(usize, usize)>,
}

impl Default for SVMClassifier {
    fn default() -> Self {
        Self::new(SVMConfig::default())
    }
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            kernel: None,
            support_vectors: None,
            dual_coef: None,
            bias: 0.0,
            platt: None,
            converged: false,
            subsampled: None,
        }
    }

    /// Compute kernel matrix, rows in parallel
    fn compute_kernel_matrix(kernel: &KernelType, x: &Array2<f64>) -> Result<Array2<f64>> {
        let n = x.nrows();
        let flat: Vec<f64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| (0..n).map(move |j| kernel.eval(x.row(i), x.row(j))))
            .collect();
        Ok(Array2::from_shape_vec((n, n), flat)?)
    }

    /// Simplified SMO with an error cache; `y` is ±1.
    /// Returns (alphas, bias, converged).
    fn smo(&self, k: &Array2<f64>, y: &Array1<f64>) -> (Array1<f64>, f64, bool) {
        let n = y.len();
        let c = self.config.c;
        let tol = self.config.tol;

        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        // errors[i] = f(x_i) - y_i with all alphas zero
        let mut errors: Array1<f64> = y.mapv(|v| -v);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(42));
        let mut stable = 0;
        let mut sweeps = 0;

        while stable < STABLE_PASSES {
            if sweeps >= self.config.max_iter {
                return (alphas, bias, false);
            }
            sweeps += 1;
            let mut changed = 0;

            for i in 0..n {
                let e_i = errors[i];
                let violates = (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0);
                if !violates {
                    continue;
                }

                let mut j = rng.gen_range(0..n - 1);
                if j >= i {
                    j += 1;
                }
                let e_j = errors[j];

                let (a_i_old, a_j_old) = (alphas[i], alphas[j]);
                let (l, h) = if y[i] != y[j] {
                    ((a_j_old - a_i_old).max(0.0), (c + a_j_old - a_i_old).min(c))
                } else {
                    ((a_i_old + a_j_old - c).max(0.0), (a_i_old + a_j_old).min(c))
                };
                if h - l < 1e-10 {
                    continue;
                }

                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                let a_j = (a_j_old - y[j] * (e_i - e_j) / eta).clamp(l, h);
                if (a_j - a_j_old).abs() < 1e-5 {
                    continue;
                }
                let a_i = a_i_old + y[i] * y[j] * (a_j_old - a_j);

                let d_i = y[i] * (a_i - a_i_old);
                let d_j = y[j] * (a_j - a_j_old);
                let b1 = bias - e_i - d_i * k[[i, i]] - d_j * k[[i, j]];
                let b2 = bias - e_j - d_i * k[[i, j]] - d_j * k[[j, j]];
                let new_bias = if a_i > 0.0 && a_i < c {
                    b1
                } else if a_j > 0.0 && a_j < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                let d_b = new_bias - bias;
                let (row_i, row_j) = (k.row(i), k.row(j));
                errors.zip_mut_with(&row_i, |e, &kv| *e += d_i * kv);
                errors.zip_mut_with(&row_j, |e, &kv| *e += d_j * kv);
                errors += d_b;

                alphas[i] = a_i;
                alphas[j] = a_j;
                bias = new_bias;
                changed += 1;
            }

            if changed == 0 {
                stable += 1;
            } else {
                stable = 0;
            }
        }

        debug!(sweeps, "SMO converged");
        (alphas, bias, true)
    }

    /// Signed distance to the separating surface
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (Some(kernel), Some(sv), Some(coef)) = (&self.kernel, &self.support_vectors, &self.dual_coef) else {
            return Err(PipelineError::ModelNotFitted);
        };
        check_n_features(sv.ncols(), x)?;

        let scores: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                self.bias
                    + sv
                        .rows()
                        .into_iter()
                        .zip(coef.iter())
                        .map(|(s, &a)| a * kernel.eval(row, s))
                        .sum::<f64>()
            })
            .collect();
        Ok(Array1::from_vec(scores))
    }

    /// (rows used, rows given) when the last fit ran on a subsample
    pub fn subsampled(&self) -> Option<(usize, usize)> {
        self.subsampled
    }

    /// Get number of support vectors
    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.as_ref().map(|sv| sv.nrows()).unwrap_or(0)
    }
}

impl Model for SVMClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        let n = x.nrows();
        if self.config.max_samples < 2 {
            return Err(PipelineError::InvalidParameter {
                name: "max_samples".to_string(),
                value: self.config.max_samples.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if !(self.config.c > 0.0) {
            return Err(PipelineError::InvalidParameter {
                name: "C".to_string(),
                value: self.config.c.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        let positives = y.iter().filter(|&&v| v == 1.0).count();
        if positives == 0 || positives == n {
            return Err(PipelineError::TrainingError(
                "SVM requires both classes in the training data".to_string(),
            ));
        }

        let sample;
        let (x, y) = if n > self.config.max_samples {
            let seed = self.config.random_state.unwrap_or(42);
            let rows = stratified_subsample(y, self.config.max_samples, seed);
            warn!(
                rows = n,
                used = rows.len(),
                max_samples = self.config.max_samples,
                "SVM training set exceeds its row budget; fitting on a stratified subsample"
            );
            self.subsampled = Some((rows.len(), n));
            sample = (x.select(Axis(0), &rows), y.select(Axis(0), &rows));
            (&sample.0, &sample.1)
        } else {
            self.subsampled = None;
            (x, y)
        };

        let kernel = self.config.kernel.resolve(x);
        let k = Self::compute_kernel_matrix(&kernel, x)?;
        let y_signed = y.mapv(|v| if v == 1.0 { 1.0 } else { -1.0 });

        let (alphas, bias, converged) = self.smo(&k, &y_signed);
        if !converged {
            warn!(max_iter = self.config.max_iter, "SVM hit its sweep cap before converging");
        }

        let support: Vec<usize> = alphas
            .iter()
            .enumerate()
            .filter(|(_, &a)| a > 1e-8)
            .map(|(i, _)| i)
            .collect();

        self.support_vectors = Some(x.select(Axis(0), &support));
        self.dual_coef = Some(support.iter().map(|&i| alphas[i] * y_signed[i]).collect());
        self.bias = bias;
        self.kernel = Some(kernel);
        self.converged = converged;

        // Platt scaling on in-sample decision values
        self.platt = if self.config.probability {
            let scores = self.decision_function(x)?;
            let mut platt = PlattScaling::new();
            platt.fit(&scores, y)?;
            Some(platt)
        } else {
            None
        };

        debug!(support_vectors = support.len(), converged, "SVM fitted");
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(|s| if s > 0.0 { 1.0 } else { 0.0 }))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        match &self.platt {
            Some(platt) => Ok(Some(platt.calibrate(&self.decision_function(x)?)?)),
            None => Ok(None),
        }
    }

    fn has_proba(&self) -> bool {
        self.config.probability
    }

    fn converged(&self) -> bool {
        self.converged
    }

    fn training_notes(&self) -> Vec<String> {
        self.subsampled
            .map(|(used, total)| format!("fitted on a stratified subsample of {} of {} rows", used, total))
            .into_iter()
            .collect()
    }
}
