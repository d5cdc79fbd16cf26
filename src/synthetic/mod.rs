//! Minority-class oversampling
//!
//! Resampling is only ever applied to the training split. Class bookkeeping
//! uses ordered maps so that the output is reproducible for a fixed seed.

mod smote;

pub use smote::SMOTE;

use crate::error::Result;
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// Result of resampling
#[derive(Debug, Clone)]
pub struct ResampleResult {
    /// Original rows followed by synthetic rows
    pub x: Array2<f64>,
    /// Labels aligned with `x`
    pub y: Array1<f64>,
    /// Number of synthetic rows appended
    pub n_synthetic: usize,
}

impl ResampleResult {
    /// Count of (negative, positive) labels after resampling
    pub fn class_balance(&self) -> (usize, usize) {
        let positives = self.y.iter().filter(|&&v| v == 1.0).count();
        (self.y.len() - positives, positives)
    }
}

/// Trait for samplers
pub trait Sampler: Send + Sync {
    /// Resample a binary-labelled training matrix
    fn resample(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<ResampleResult>;
}

/// Label counts keyed by class (labels are 0/1 so the cast is exact)
pub fn class_counts(y: &Array1<f64>) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    for &label in y.iter() {
        *counts.entry(label as i64).or_insert(0) += 1;
    }
    counts
}

/// Row indices for each class, in row order
pub fn class_indices(y: &Array1<f64>) -> BTreeMap<i64, Vec<usize>> {
    let mut indices = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices.entry(label as i64).or_insert_with(Vec::new).push(i);
    }
    indices
}
