//! Artifact persistence and run reporting
//!
//! An artifact directory holds:
//! - `scaler.json`, `champion_model.json` and `model_features.txt` (needed for prediction)
//! - `model_comparison.csv` with one row per candidate
//! - `feature_importance.csv` and `test_predictions.csv` when available
//! - `summary_report.md`
//! - `manifest.json`, written last

mod artifacts;
mod report;

pub use artifacts::{
    ArtifactBundle, ArtifactStore, ChampionArtifact, RunManifest, COMPARISON_FILE, FEATURES_FILE,
    IMPORTANCE_FILE, MANIFEST_FILE, MODEL_FILE, PREDICTIONS_FILE, REPORT_FILE, SCALER_FILE,
};
pub use report::{comparison_frame, importance_frame, RunSummary, COMPARISON_COLUMNS};
