//! Neural Network (Multi-Layer Perceptron) classifier
//!
//! A feedforward network with a two-unit softmax output, trained with
//! mini-batch SGD, momentum, L2 weight decay and an adaptive learning rate.

use crate::error::{PipelineError, Result};
use crate::training::models::{check_n_features, check_training_data, sigmoid, threshold, Model};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Learning rate floor; the adaptive schedule stops below it
const MIN_LEARNING_RATE: f64 = 1e-6;

/// Stalled epochs before the learning rate is divided by five
const ADAPTIVE_PATIENCE: usize = 2;

/// Hidden-layer activation function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Rectified Linear Unit
    #[default]
    Relu,
    /// Hyperbolic tangent
    Tanh,
    /// Logistic sigmoid
    Sigmoid,
}

impl Activation {
    fn apply(self, z: &mut Array2<f64>) {
        match self {
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Activation::Tanh => z.mapv_inplace(f64::tanh),
            Activation::Sigmoid => z.mapv_inplace(sigmoid),
        }
    }

    /// Derivative written in terms of the activation output
    fn derivative(self, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Tanh => a.mapv(|v| 1.0 - v * v),
            Activation::Sigmoid => a.mapv(|v| v * (1.0 - v)),
        }
    }

    /// Glorot uniform numerator
    fn init_factor(self) -> f64 {
        match self {
            Activation::Sigmoid => 2.0,
            _ => 6.0,
        }
    }
}

/// Neural network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MLPConfig {
    /// Hidden layer sizes
    pub hidden_layer_sizes: Vec<usize>,
    /// Activation for hidden layers
    pub activation: Activation,
    /// L2 penalty
    pub alpha: f64,
    /// Initial learning rate
    pub learning_rate_init: f64,
    /// Momentum
    pub momentum: f64,
    /// Mini-batch size (clamped to the sample count)
    pub batch_size: usize,
    /// Maximum epochs
    pub max_iter: usize,
    /// Minimum loss improvement that counts as progress
    pub tol: f64,
    /// Epochs without progress before training stops
    pub n_iter_no_change: usize,
    /// Random seed for initialization and shuffling
    pub random_state: Option<u64>,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layer_sizes: vec![100],
            activation: Activation::Relu,
            alpha: 1e-4,
            learning_rate_init: 0.01,
            momentum: 0.9,
            batch_size: 200,
            max_iter: 200,
            tol: 1e-4,
            n_iter_no_change: 10,
            random_state: None,
        }
    }
}

impl MLPConfig {
    pub fn with_hidden_layers(mut self, sizes: Vec<usize>) -> Self {
        self.hidden_layer_sizes = sizes;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate_init = lr;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.hidden_layer_sizes.iter().any(|&s| s == 0) {
            return Err(PipelineError::InvalidParameter {
                name: "hidden_layer_sizes".to_string(),
                value: format!("{:?}", self.hidden_layer_sizes),
                reason: "layers must have at least one unit".to_string(),
            });
        }
        if !(self.learning_rate_init > 0.0) {
            return Err(PipelineError::InvalidParameter {
                name: "learning_rate_init".to_string(),
                value: self.learning_rate_init.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(PipelineError::InvalidParameter {
                name: "momentum".to_string(),
                value: self.momentum.to_string(),
                reason: "must be in [0, 1)".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidParameter {
                name: "batch_size".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Multi-Layer Perceptron binary classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPClassifier {
    pub config: MLPConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    n_features: usize,
    loss_curve: Vec<f64>,
    converged: bool,
}

impl Default for MLPClassifier {
    fn default() -> Self {
        Self::new(MLPConfig::default())
    }
}

impl MLPClassifier {
    pub fn new(config: MLPConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            biases: Vec::new(),
            n_features: 0,
            loss_curve: Vec::new(),
            converged: false,
        }
    }

    /// Mean training loss per epoch
    pub fn loss_curve(&self) -> &[f64] {
        &self.loss_curve
    }

    /// Epochs actually run
    pub fn n_iter(&self) -> usize {
        self.loss_curve.len()
    }

    fn initialize_weights<R: Rng>(&mut self, rng: &mut R) {
        self.weights.clear();
        self.biases.clear();

        let mut sizes = vec![self.n_features];
        sizes.extend(&self.config.hidden_layer_sizes);
        sizes.push(2);

        let factor = self.config.activation.init_factor();
        for pair in sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            let bound = (factor / (n_in + n_out) as f64).sqrt();
            self.weights
                .push(Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-bound..bound)));
            self.biases
                .push(Array1::from_shape_fn(n_out, |_| rng.gen_range(-bound..bound)));
        }
    }

    /// Layer outputs, starting with the input itself
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = Vec::with_capacity(self.weights.len() + 1);
        activations.push(x.to_owned());
        let last = self.weights.len() - 1;

        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let mut z = activations[i].dot(w) + b;
            if i < last {
                self.config.activation.apply(&mut z);
            } else {
                softmax_rows(&mut z);
            }
            activations.push(z);
        }
        activations
    }

    fn backward(
        &self,
        activations: &[Array2<f64>],
        targets: &Array2<f64>,
    ) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = targets.nrows() as f64;
        let mut gradients = Vec::with_capacity(self.weights.len());

        // Softmax with cross-entropy
        let mut delta = (&activations[activations.len() - 1] - targets) / n;

        for layer in (0..self.weights.len()).rev() {
            let grad_w = activations[layer].t().dot(&delta) + &self.weights[layer] * (self.config.alpha / n);
            let grad_b = delta.sum_axis(Axis(0));
            if layer > 0 {
                delta = delta.dot(&self.weights[layer].t())
                    * self.config.activation.derivative(&activations[layer]);
            }
            gradients.push((grad_w, grad_b));
        }

        gradients.reverse();
        gradients
    }

    fn positive_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.weights.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;
        let activations = self.forward(x);
        Ok(activations[activations.len() - 1].column(1).to_owned())
    }
}

fn softmax_rows(z: &mut Array2<f64>) {
    for mut row in z.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
}

fn cross_entropy(output: &Array2<f64>, targets: &Array2<f64>) -> f64 {
    let total: f64 = output
        .iter()
        .zip(targets.iter())
        .filter(|(_, t)| **t > 0.0)
        .map(|(&p, _)| -p.max(1e-15).ln())
        .sum();
    total / output.nrows() as f64
}

impl Model for MLPClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        self.config.validate()?;

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        self.loss_curve.clear();
        self.converged = false;

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(42));
        self.initialize_weights(&mut rng);

        let targets = Array2::from_shape_fn((n_samples, 2), |(i, c)| {
            if (y[i] > 0.5) == (c == 1) { 1.0 } else { 0.0 }
        });

        let mut velocity_w: Vec<Array2<f64>> =
            self.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
        let mut velocity_b: Vec<Array1<f64>> =
            self.biases.iter().map(|b| Array1::zeros(b.len())).collect();

        let batch_size = self.config.batch_size.min(n_samples);
        let momentum = self.config.momentum;
        let mut learning_rate = self.config.learning_rate_init;
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0usize;
        let mut stalled = 0usize;
        let mut order: Vec<usize> = (0..n_samples).collect();

        for epoch in 0..self.config.max_iter {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let x_batch = x.select(Axis(0), batch);
                let t_batch = targets.select(Axis(0), batch);

                let activations = self.forward(&x_batch);
                epoch_loss += cross_entropy(&activations[activations.len() - 1], &t_batch)
                    * batch.len() as f64;

                let gradients = self.backward(&activations, &t_batch);
                for (layer, (grad_w, grad_b)) in gradients.into_iter().enumerate() {
                    velocity_w[layer] = &velocity_w[layer] * momentum - &grad_w * learning_rate;
                    velocity_b[layer] = &velocity_b[layer] * momentum - &grad_b * learning_rate;
                    self.weights[layer] += &velocity_w[layer];
                    self.biases[layer] += &velocity_b[layer];
                }
            }

            let penalty: f64 = self.weights.iter().map(|w| w.iter().map(|v| v * v).sum::<f64>()).sum();
            let loss = epoch_loss / n_samples as f64 + 0.5 * self.config.alpha * penalty / n_samples as f64;
            if !loss.is_finite() {
                return Err(PipelineError::TrainingError(format!(
                    "neural network loss diverged at epoch {}",
                    epoch + 1
                )));
            }
            self.loss_curve.push(loss);

            if loss > best_loss - self.config.tol {
                no_improvement += 1;
                stalled += 1;
            } else {
                no_improvement = 0;
                stalled = 0;
            }
            best_loss = best_loss.min(loss);

            if stalled >= ADAPTIVE_PATIENCE {
                learning_rate /= 5.0;
                stalled = 0;
                debug!(epoch = epoch + 1, learning_rate, "MLP learning rate reduced");
            }

            if no_improvement >= self.config.n_iter_no_change || learning_rate < MIN_LEARNING_RATE {
                self.converged = true;
                break;
            }
        }

        if self.converged {
            debug!(epochs = self.n_iter(), loss = best_loss, "MLP converged");
        } else {
            warn!(
                max_iter = self.config.max_iter,
                loss = best_loss,
                "MLP reached max_iter without converging"
            );
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold(&self.positive_proba(x)?))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        self.positive_proba(x).map(Some)
    }

    fn has_proba(&self) -> bool {
        true
    }

    fn converged(&self) -> bool {
        self.converged
    }
}
