//! Reproducible synthetic encounter tables for demos, tests and benches

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Build a table with the given feature columns plus `label`.
///
/// Features are shifted and scaled standard normals. The label is positive for
/// the top `positive_rate` share of a noisy linear score over the first three
/// features, so the positive rate is exact and the signal is learnable.
pub fn synthetic_table(
    n_rows: usize,
    features: &[String],
    label: &str,
    positive_rate: f64,
    seed: u64,
) -> Result<DataFrame> {
    if features.is_empty() || n_rows < 2 {
        return Err(PipelineError::InvalidParameter {
            name: "n_rows".to_string(),
            value: n_rows.to_string(),
            reason: "need at least 2 rows and 1 feature".to_string(),
        });
    }
    if !(positive_rate > 0.0 && positive_rate < 1.0) {
        return Err(PipelineError::InvalidParameter {
            name: "positive_rate".to_string(),
            value: positive_rate.to_string(),
            reason: "must be in (0, 1)".to_string(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_features = features.len();

    let mut z = vec![vec![0.0; n_rows]; n_features];
    for column in z.iter_mut() {
        for v in column.iter_mut() {
            *v = standard_normal(&mut rng);
        }
    }

    let weights = [2.0, -1.5, 1.0];
    let scores: Vec<f64> = (0..n_rows)
        .map(|r| {
            let signal: f64 = weights
                .iter()
                .take(n_features)
                .enumerate()
                .map(|(j, w)| w * z[j][r])
                .sum();
            signal + 0.1 * standard_normal(&mut rng)
        })
        .collect();

    let n_positive = ((n_rows as f64) * positive_rate).round().max(1.0) as usize;
    let mut order: Vec<usize> = (0..n_rows).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    let mut labels = vec![0i32; n_rows];
    for &r in order.iter().take(n_positive) {
        labels[r] = 1;
    }

    let mut columns: Vec<Column> = features
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let offset = 5.0 * j as f64;
            let scale = 1.0 + j as f64 * 0.5;
            let values: Vec<f64> = z[j].iter().map(|v| offset + scale * v).collect();
            Column::new(name.as_str().into(), values)
        })
        .collect();
    columns.push(Column::new(label.into(), labels));

    Ok(DataFrame::new(columns)?)
}

/// Box-Muller transform
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_positive_rate() {
        let features: Vec<String> = (0..4).map(|i| format!("f{}", i)).collect();
        let df = synthetic_table(1000, &features, "label", 0.1, 42).unwrap();

        assert_eq!(df.height(), 1000);
        assert_eq!(df.width(), 5);
        let positives = df
            .column("label")
            .unwrap()
            .as_materialized_series()
            .i32()
            .unwrap()
            .into_iter()
            .filter(|v| *v == Some(1))
            .count();
        assert_eq!(positives, 100);
    }

    #[test]
    fn test_same_seed_same_table() {
        let features = vec!["a".to_string(), "b".to_string()];
        let a = synthetic_table(50, &features, "y", 0.2, 7).unwrap();
        let b = synthetic_table(50, &features, "y", 0.2, 7).unwrap();
        assert!(a.equals(&b));
    }
}
