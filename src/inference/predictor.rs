//! Prediction with a persisted champion

use crate::error::{PipelineError, Result};
use crate::export::{ArtifactStore, ChampionArtifact};
use crate::preprocessing::{FeatureScaler, ScalingParameters};
use crate::training::{Model, ModelKind};
use ndarray::{Array2, ArrayView2, Axis};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Rows above which scoring is split into parallel batches
const DEFAULT_BATCH_SIZE: usize = 1024;

/// Outcome for one encounter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// 1 = predicted readmission
    pub label: u8,
    /// Positive-class probability, absent for label-only champions
    pub probability: Option<f64>,
}

/// Scales incoming rows with the persisted parameters and scores them with
/// the champion. Feature names and order must match training exactly.
#[derive(Debug, Clone)]
pub struct Predictor {
    features: Vec<String>,
    scaler: FeatureScaler,
    champion: ChampionArtifact,
    batch_size: usize,
}

impl Predictor {
    /// Load `scaler.json`, `champion_model.json` and `model_features.txt`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let store = ArtifactStore::new(dir.as_ref());
        let features = store.load_features()?;
        let params = store.load_scaler()?;
        let champion = store.load_champion()?;

        if params.feature_names != features {
            return Err(PipelineError::ArtifactError {
                path: dir.as_ref().display().to_string(),
                reason: "feature list does not match the scaler's features".to_string(),
            });
        }

        info!(
            dir = %dir.as_ref().display(),
            champion = %champion.id,
            features = features.len(),
            "Predictor loaded"
        );
        Ok(Self {
            features,
            scaler: FeatureScaler::from_params(params),
            champion,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Build from in-memory parts, as the pipeline holds them after a run
    pub fn from_parts(params: ScalingParameters, champion: ChampionArtifact) -> Self {
        Self {
            features: params.feature_names.clone(),
            scaler: FeatureScaler::from_params(params),
            champion,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn feature_names(&self) -> &[String] {
        &self.features
    }

    pub fn champion_id(&self) -> &str {
        &self.champion.id
    }

    pub fn champion_kind(&self) -> ModelKind {
        self.champion.kind
    }

    pub fn has_proba(&self) -> bool {
        self.champion.model.has_proba()
    }

    /// Fails unless `names` is exactly the training feature list
    pub fn check_features(&self, names: &[String]) -> Result<()> {
        if names != self.features.as_slice() {
            return Err(PipelineError::FeatureMismatch {
                expected: self.features.join(", "),
                actual: names.join(", "),
            });
        }
        Ok(())
    }

    /// Score raw (unscaled) rows whose columns are named by `names`
    pub fn predict(&self, names: &[String], rows: &Array2<f64>) -> Result<Vec<ClassificationResult>> {
        self.check_features(names)?;
        if rows.ncols() != names.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} columns", names.len()),
                actual: format!("{} columns", rows.ncols()),
            });
        }

        if rows.nrows() <= self.batch_size {
            return self.predict_batch(rows.view());
        }

        let batches: Vec<ArrayView2<f64>> = rows.axis_chunks_iter(Axis(0), self.batch_size).collect();
        debug!(rows = rows.nrows(), batches = batches.len(), "Scoring in parallel batches");
        let results = batches
            .into_par_iter()
            .map(|batch| self.predict_batch(batch))
            .collect::<Result<Vec<_>>>()?;
        Ok(results.into_iter().flatten().collect())
    }

    /// Score a frame whose columns are exactly the training features, in order
    pub fn predict_frame(&self, df: &DataFrame) -> Result<Vec<ClassificationResult>> {
        let names: Vec<String> = df.get_column_names_str().into_iter().map(str::to_string).collect();
        self.check_features(&names)?;
        let rows = crate::data::frame_to_array(df, &self.features)?;
        self.predict(&names, &rows)
    }

    fn predict_batch(&self, rows: ArrayView2<f64>) -> Result<Vec<ClassificationResult>> {
        let scaled = self.scaler.transform(&rows.to_owned())?;
        let labels = self.champion.model.predict(&scaled)?;
        let proba = self.champion.model.predict_proba(&scaled)?;

        Ok(labels
            .iter()
            .enumerate()
            .map(|(i, &label)| ClassificationResult {
                label: if label > 0.5 { 1 } else { 0 },
                probability: proba.as_ref().map(|p| p[i]),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::CandidateModel;
    use crate::training::{LogisticConfig, ModelSpec, ModelTrainer};
    use ndarray::{array, Array1};
    use std::sync::Arc;

    fn predictor() -> Predictor {
        let x = array![[-2.0, 0.0], [-1.0, 1.0], [1.0, 0.0], [2.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let spec = ModelSpec::LogisticRegression(LogisticConfig::default());
        let model = ModelTrainer::new(spec.clone()).fit(&x, &y).unwrap();
        let params = ScalingParameters {
            feature_names: vec!["a".to_string(), "b".to_string()],
            means: Array1::zeros(2),
            stds: Array1::ones(2),
        };
        Predictor::from_parts(
            params,
            ChampionArtifact {
                id: "Logistic Regression".to_string(),
                kind: ModelKind::LogisticRegression,
                hyperparameters: spec.describe(),
                model: CandidateModel::Single(Arc::new(model)),
            },
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_predict_in_order() {
        let p = predictor();
        let out = p.predict(&names(&["a", "b"]), &array![[-3.0, 0.0], [3.0, 1.0]]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, 0);
        assert_eq!(out[1].label, 1);
        assert!(out[1].probability.unwrap() > 0.5);
    }

    #[test]
    fn test_reordered_features_fail_fast() {
        let p = predictor();
        let err = p.predict(&names(&["b", "a"]), &array![[0.0, 3.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::FeatureMismatch { .. }));

        let err = p.predict(&names(&["a"]), &array![[3.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::FeatureMismatch { .. }));
    }

    #[test]
    fn test_predict_frame_checks_columns() {
        let p = predictor();
        let good = df!("a" => [-3.0, 3.0], "b" => [0.0, 1.0]).unwrap();
        assert_eq!(p.predict_frame(&good).unwrap().len(), 2);

        let swapped = df!("b" => [0.0, 1.0], "a" => [-3.0, 3.0]).unwrap();
        assert!(matches!(p.predict_frame(&swapped), Err(PipelineError::FeatureMismatch { .. })));
    }

    #[test]
    fn test_batched_matches_single_pass() {
        let p = predictor();
        let rows = Array2::from_shape_fn((50, 2), |(i, j)| (i as f64 - 25.0) / 5.0 + j as f64);
        let whole = p.predict(&names(&["a", "b"]), &rows).unwrap();
        let batched = p.clone().with_batch_size(7).predict(&names(&["a", "b"]), &rows).unwrap();
        assert_eq!(whole, batched);
    }
}
