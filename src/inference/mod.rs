//! Prediction-time interface
//!
//! Loads a persisted artifact directory and scores new encounters:
//! - Exact feature-name and order check before any computation
//! - Scaling with the persisted training statistics
//! - Parallel batch scoring via rayon for large inputs
//! - Probability output when the champion supports it

mod predictor;

pub use predictor::{ClassificationResult, Predictor};
