//! Standard-score feature scaling

use crate::data::frame_to_array;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-feature statistics computed from the training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingParameters {
    /// Feature names in column order
    pub feature_names: Vec<String>,
    /// Column means
    pub means: Array1<f64>,
    /// Column population standard deviations (0 marks a zero-variance column)
    pub stds: Array1<f64>,
}

impl ScalingParameters {
    /// Names of columns whose standard deviation is zero
    pub fn zero_variance_features(&self) -> Vec<&str> {
        self.feature_names
            .iter()
            .zip(self.stds.iter())
            .filter(|(_, &s)| s == 0.0)
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// Standard scaler: `(x - mean) / std`, fit once and reused unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureScaler {
    params: Option<ScalingParameters>,
}

impl FeatureScaler {
    pub fn new() -> Self {
        Self { params: None }
    }

    /// Rebuild a scaler from persisted parameters
    pub fn from_params(params: ScalingParameters) -> Self {
        Self { params: Some(params) }
    }

    /// Fit on the training matrix; columns are named by `feature_names`
    pub fn fit(&mut self, x: &Array2<f64>, feature_names: &[String]) -> Result<&ScalingParameters> {
        if x.ncols() != feature_names.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} columns", feature_names.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        if x.nrows() == 0 {
            return Err(PipelineError::ValidationError(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }

        let means = x
            .mean_axis(Axis(0))
            .ok_or_else(|| PipelineError::ValidationError("empty matrix".to_string()))?;
        let mut stds = x.std_axis(Axis(0), 0.0);
        // Tiny spreads are float noise around a constant
        stds.mapv_inplace(|s| if s.is_finite() && s > 1e-12 { s } else { 0.0 });

        let params = ScalingParameters {
            feature_names: feature_names.to_vec(),
            means,
            stds,
        };

        for name in params.zero_variance_features() {
            warn!(feature = %name, "Zero-variance feature, scaled values fixed at 0");
        }
        debug!(features = params.feature_names.len(), rows = x.nrows(), "Fitted scaler");

        Ok(self.params.insert(params))
    }

    /// Fit on named columns of a data frame
    pub fn fit_frame(&mut self, df: &DataFrame, feature_names: &[String]) -> Result<&ScalingParameters> {
        let x = frame_to_array(df, feature_names)?;
        self.fit(&x, feature_names)
    }

    /// Apply the fitted parameters; zero-variance columns map to 0
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.params.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != params.means.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} columns", params.means.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.to_owned();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let mean = params.means[j];
            let std = params.stds[j];
            if std == 0.0 {
                col.fill(0.0);
            } else {
                col.mapv_inplace(|v| (v - mean) / std);
            }
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>, feature_names: &[String]) -> Result<Array2<f64>> {
        self.fit(x, feature_names)?;
        self.transform(x)
    }

    /// Map scaled values back to the original units
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.params.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != params.means.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} columns", params.means.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.to_owned();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let mean = params.means[j];
            let std = params.stds[j];
            col.mapv_inplace(|v| v * std + mean);
        }
        Ok(out)
    }

    pub fn params(&self) -> Option<&ScalingParameters> {
        self.params.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_round_trip_mean_zero_std_one() {
        let x = array![
            [1.0, 100.0, -3.0],
            [2.0, 250.0, 0.5],
            [3.0, 175.0, 9.0],
            [10.0, 50.0, 4.0],
            [4.0, 90.0, -1.0],
        ];
        let mut scaler = FeatureScaler::new();
        let scaled = scaler.fit_transform(&x, &names(3)).unwrap();

        let means = scaled.mean_axis(Axis(0)).unwrap();
        let stds = scaled.std_axis(Axis(0), 0.0);
        for j in 0..3 {
            assert!(means[j].abs() < 1e-10, "mean {} = {}", j, means[j]);
            assert!((stds[j] - 1.0).abs() < 1e-10, "std {} = {}", j, stds[j]);
        }
    }

    #[test]
    fn test_zero_variance_maps_to_zero() {
        let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0]];
        let mut scaler = FeatureScaler::new();
        let scaled = scaler.fit_transform(&x, &names(2)).unwrap();

        assert!(scaled.column(1).iter().all(|&v| v == 0.0));
        assert!(scaled.iter().all(|v| v.is_finite()));
        assert_eq!(scaler.params().unwrap().zero_variance_features(), vec!["f1"]);
    }

    #[test]
    fn test_test_data_uses_training_statistics() {
        let train = array![[0.0], [2.0]];
        let test = array![[4.0]];
        let mut scaler = FeatureScaler::new();
        scaler.fit(&train, &names(1)).unwrap();

        let scaled = scaler.transform(&test).unwrap();
        // mean 1, population std 1
        assert!((scaled[[0, 0]] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let mut scaler = FeatureScaler::new();
        scaler.fit(&array![[1.0, 2.0], [3.0, 4.0]], &names(2)).unwrap();
        assert!(scaler.transform(&array![[1.0]]).is_err());
    }

    #[test]
    fn test_unfitted_transform_fails() {
        let scaler = FeatureScaler::new();
        assert!(matches!(
            scaler.transform(&array![[1.0]]),
            Err(PipelineError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_inverse_transform() {
        let x = array![[1.0, 5.0], [3.0, 9.0]];
        let mut scaler = FeatureScaler::new();
        let scaled = scaler.fit_transform(&x, &names(2)).unwrap();
        let restored = scaler.inverse_transform(&scaled).unwrap();
        for (a, b) in restored.iter().zip(x.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_fit_frame_reports_missing_column() {
        let df = polars::df!("a" => &[1.0, 2.0]).unwrap();
        let mut scaler = FeatureScaler::new();
        let err = scaler.fit_frame(&df, &["a".into(), "b".into()]).unwrap_err();
        assert!(matches!(err, PipelineError::FeatureNotFound(_)));
    }
}
