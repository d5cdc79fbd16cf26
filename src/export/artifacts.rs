//! Artifact directory persistence
//!
//! Everything is written into a hidden sibling directory first and only
//! renamed into place once the manifest is on disk, so a reader never sees a
//! partially written artifact set under the target name.

use crate::data::load_csv;
use crate::error::{PipelineError, Result};
use crate::evaluation::Metric;
use crate::preprocessing::ScalingParameters;
use crate::selection::CandidateModel;
use crate::training::ModelKind;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SCALER_FILE: &str = "scaler.json";
pub const MODEL_FILE: &str = "champion_model.json";
pub const FEATURES_FILE: &str = "model_features.txt";
pub const COMPARISON_FILE: &str = "model_comparison.csv";
pub const IMPORTANCE_FILE: &str = "feature_importance.csv";
pub const PREDICTIONS_FILE: &str = "test_predictions.csv";
pub const REPORT_FILE: &str = "summary_report.md";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Serialized champion: enough to rebuild `predict` and `predict_proba`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChampionArtifact {
    pub id: String,
    pub kind: ModelKind,
    pub hyperparameters: String,
    pub model: CandidateModel,
}

/// Describes a completed artifact directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub crate_version: String,
    pub champion_id: String,
    pub champion_kind: ModelKind,
    pub selection_metric: Metric,
    pub selection_score: f64,
    pub seed: u64,
    pub files: Vec<String>,
}

/// Everything one run persists. Optional parts are skipped when absent.
pub struct ArtifactBundle<'a> {
    pub scaler: &'a ScalingParameters,
    pub champion: &'a ChampionArtifact,
    pub comparison: DataFrame,
    pub importances: Option<DataFrame>,
    pub test_predictions: Option<DataFrame>,
    pub report: Option<String>,
    pub selection_metric: Metric,
    pub selection_score: f64,
    pub seed: u64,
}

/// Writes and reads one artifact directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the bundle to a temporary directory and swap it into place.
    ///
    /// On failure the temporary directory is removed and any previous artifact
    /// set under the target name is left as it was.
    pub fn persist(&self, bundle: ArtifactBundle<'_>) -> Result<RunManifest> {
        let parent = match self.root.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| artifact_error(&parent, e))?;

        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PipelineError::ArtifactError {
                path: self.root.display().to_string(),
                reason: "artifact path has no directory name".to_string(),
            })?;
        let staging = parent.join(format!(".{}.tmp-{}", name, Uuid::new_v4()));
        fs::create_dir(&staging).map_err(|e| artifact_error(&staging, e))?;
        debug!(staging = %staging.display(), "Writing artifacts");

        let manifest = match write_all(&staging, bundle) {
            Ok(manifest) => manifest,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        self.swap_into_place(&parent, &name, &staging)?;
        info!(
            dir = %self.root.display(),
            files = manifest.files.len(),
            champion = %manifest.champion_id,
            "Artifacts persisted"
        );
        Ok(manifest)
    }

    fn swap_into_place(&self, parent: &Path, name: &str, staging: &Path) -> Result<()> {
        if !self.root.exists() {
            return fs::rename(staging, &self.root).map_err(|e| {
                let _ = fs::remove_dir_all(staging);
                artifact_error(&self.root, e)
            });
        }

        let backup = parent.join(format!(".{}.old-{}", name, Uuid::new_v4()));
        if let Err(e) = fs::rename(&self.root, &backup) {
            let _ = fs::remove_dir_all(staging);
            return Err(artifact_error(&self.root, e));
        }
        if let Err(e) = fs::rename(staging, &self.root) {
            // Put the previous artifact set back
            let _ = fs::rename(&backup, &self.root);
            let _ = fs::remove_dir_all(staging);
            return Err(artifact_error(&self.root, e));
        }
        if let Err(e) = fs::remove_dir_all(&backup) {
            warn!(path = %backup.display(), error = %e, "Failed to remove previous artifacts");
        }
        Ok(())
    }

    pub fn load_scaler(&self) -> Result<ScalingParameters> {
        read_json(&self.root.join(SCALER_FILE))
    }

    pub fn load_champion(&self) -> Result<ChampionArtifact> {
        read_json(&self.root.join(MODEL_FILE))
    }

    pub fn load_manifest(&self) -> Result<RunManifest> {
        read_json(&self.root.join(MANIFEST_FILE))
    }

    /// Feature names in training order, one per line
    pub fn load_features(&self) -> Result<Vec<String>> {
        let path = self.root.join(FEATURES_FILE);
        let text = fs::read_to_string(&path).map_err(|e| artifact_error(&path, e))?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn load_comparison(&self) -> Result<DataFrame> {
        load_csv(&self.root.join(COMPARISON_FILE))
    }
}

fn write_all(dir: &Path, bundle: ArtifactBundle<'_>) -> Result<RunManifest> {
    let mut files = Vec::new();

    write_json(&dir.join(SCALER_FILE), bundle.scaler)?;
    files.push(SCALER_FILE.to_string());

    write_json(&dir.join(MODEL_FILE), bundle.champion)?;
    files.push(MODEL_FILE.to_string());

    let path = dir.join(FEATURES_FILE);
    let mut features = String::new();
    for name in &bundle.scaler.feature_names {
        features.push_str(name);
        features.push('\n');
    }
    fs::write(&path, features).map_err(|e| artifact_error(&path, e))?;
    files.push(FEATURES_FILE.to_string());

    let mut comparison = bundle.comparison;
    write_csv(&dir.join(COMPARISON_FILE), &mut comparison)?;
    files.push(COMPARISON_FILE.to_string());

    if let Some(mut df) = bundle.importances {
        write_csv(&dir.join(IMPORTANCE_FILE), &mut df)?;
        files.push(IMPORTANCE_FILE.to_string());
    }

    if let Some(mut df) = bundle.test_predictions {
        write_csv(&dir.join(PREDICTIONS_FILE), &mut df)?;
        files.push(PREDICTIONS_FILE.to_string());
    }

    if let Some(report) = bundle.report {
        let path = dir.join(REPORT_FILE);
        fs::write(&path, report).map_err(|e| artifact_error(&path, e))?;
        files.push(REPORT_FILE.to_string());
    }

    files.push(MANIFEST_FILE.to_string());
    let manifest = RunManifest {
        created_at: Utc::now(),
        crate_version: env!("CARGO_PKG_VERSION").to_string(),
        champion_id: bundle.champion.id.clone(),
        champion_kind: bundle.champion.kind,
        selection_metric: bundle.selection_metric,
        selection_score: bundle.selection_score,
        seed: bundle.seed,
        files,
    };
    write_json(&dir.join(MANIFEST_FILE), &manifest)?;
    Ok(manifest)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| artifact_error(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| artifact_error(path, e))?;
    writer.flush().map_err(|e| artifact_error(path, e))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| artifact_error(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| artifact_error(path, e))
}

fn write_csv(path: &Path, df: &mut DataFrame) -> Result<()> {
    let file = File::create(path).map_err(|e| artifact_error(path, e))?;
    CsvWriter::new(BufWriter::new(file))
        .include_header(true)
        .finish(df)
        .map_err(|e| artifact_error(path, e))
}

fn artifact_error(path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::ArtifactError {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}
