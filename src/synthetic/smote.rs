//! SMOTE (Synthetic Minority Over-sampling Technique)

use crate::error::{PipelineError, Result};
use crate::synthetic::{class_indices, ResampleResult, Sampler};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, info, warn};

/// Distance/index pair ordered by distance then index, so neighbour sets
/// are stable when distances tie
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// Balances a binary training set by interpolating between minority samples
/// and their nearest same-class neighbours
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    /// Number of nearest neighbours
    k_neighbors: usize,
    /// Random seed
    seed: u64,
}

impl SMOTE {
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            seed: 42,
        }
    }

    /// Set number of neighbours
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).powi(2)).sum()
    }

    /// k nearest neighbours of `samples[i]` among `samples`, excluding `i`
    /// itself, as positions into `samples` sorted nearest first
    fn neighbors_of(i: usize, samples: &[ArrayView1<f64>], k: usize) -> Vec<usize> {
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);
        let point = samples[i];

        for (j, other) in samples.iter().enumerate() {
            if j == i {
                continue;
            }
            let candidate = DistIdx(Self::squared_distance(point, *other), j);
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate < *worst {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        heap.into_sorted_vec().into_iter().map(|DistIdx(_, j)| j).collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SMOTE {
    fn resample(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<ResampleResult> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }

        let indices = class_indices(y);
        if indices.len() < 2 {
            warn!(classes = indices.len(), "No minority class to oversample, SMOTE is a no-op");
            return Ok(ResampleResult {
                x: x.clone(),
                y: y.clone(),
                n_synthetic: 0,
            });
        }
        if indices.len() > 2 {
            return Err(PipelineError::ValidationError(format!(
                "SMOTE expects binary labels, found {} classes",
                indices.len()
            )));
        }

        // Ordered map: on equal counts the lower label is treated as majority
        let mut by_size: Vec<(i64, &Vec<usize>)> = indices.iter().map(|(&c, v)| (c, v)).collect();
        by_size.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));
        let (_, majority) = by_size[0];
        let (minority_class, minority) = by_size[1];

        let n_to_generate = majority.len() - minority.len();
        if n_to_generate == 0 {
            debug!("Classes already balanced, SMOTE is a no-op");
            return Ok(ResampleResult {
                x: x.clone(),
                y: y.clone(),
                n_synthetic: 0,
            });
        }

        let k = self.k_neighbors.min(minority.len() - 1);
        if k < self.k_neighbors {
            warn!(
                minority = minority.len(),
                requested_k = self.k_neighbors,
                effective_k = k,
                "Minority class smaller than k+1, reducing neighbour count"
            );
        }

        let samples: Vec<ArrayView1<f64>> = minority.iter().map(|&i| x.row(i)).collect();
        let neighbors: Vec<Vec<usize>> = (0..samples.len())
            .into_par_iter()
            .map(|i| Self::neighbors_of(i, &samples, k))
            .collect();

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let n_features = x.ncols();
        let mut synthetic: Vec<f64> = Vec::with_capacity(n_to_generate * n_features);

        for _ in 0..n_to_generate {
            let base = rng.gen_range(0..samples.len());
            let point = samples[base];
            match neighbors[base].as_slice() {
                // A lone minority sample has no neighbours: duplicate it
                [] => synthetic.extend(point.iter().copied()),
                candidates => {
                    let neighbor = samples[candidates[rng.gen_range(0..candidates.len())]];
                    let gap: f64 = rng.gen();
                    synthetic.extend(
                        point
                            .iter()
                            .zip(neighbor.iter())
                            .map(|(&p, &n)| p + gap * (n - p)),
                    );
                }
            }
        }

        // Original rows followed by synthetic rows
        let n_original = x.nrows();
        let n_total = n_original + n_to_generate;
        let result_x = Array2::from_shape_fn((n_total, n_features), |(i, j)| {
            if i < n_original {
                x[[i, j]]
            } else {
                synthetic[(i - n_original) * n_features + j]
            }
        });

        let mut all_y: Vec<f64> = y.to_vec();
        all_y.extend(std::iter::repeat(minority_class as f64).take(n_to_generate));

        info!(
            original = n_original,
            synthetic = n_to_generate,
            k,
            seed = self.seed,
            "SMOTE resampled training split"
        );

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic: n_to_generate,
        })
    }
}
