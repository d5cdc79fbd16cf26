//! Pipeline run configuration and built-in profiles

use crate::data::{default_features, DEFAULT_LABEL};
use crate::ensemble::{StackingBase, StackingConfig, VotingStrategy};
use crate::error::{PipelineError, Result};
use crate::evaluation::Metric;
use crate::training::{
    Activation, GradientBoostingConfig, KernelType, LogisticConfig, MLPConfig, MaxFeatures,
    ModelSpec, RandomForestConfig, SVMConfig, XGBoostConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable that overrides the artifact root
pub const MODELS_DIR_ENV: &str = "READMISSION_MODELS_DIR";

/// Built-in run profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Grid-searched logistic regression, random forest and XGBoost, chosen by F1
    #[default]
    Baseline,
    /// SMOTE, five tuned families and two ensembles, chosen by accuracy
    Advanced,
}

impl Profile {
    pub fn config(self) -> PipelineConfig {
        match self {
            Profile::Baseline => PipelineConfig::baseline(),
            Profile::Advanced => PipelineConfig::advanced(),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Baseline => f.write_str("baseline"),
            Profile::Advanced => f.write_str("advanced"),
        }
    }
}

impl FromStr for Profile {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" | "basic" => Ok(Profile::Baseline),
            "advanced" => Ok(Profile::Advanced),
            other => Err(PipelineError::ConfigError(format!(
                "unknown profile '{}'; expected baseline or advanced",
                other
            ))),
        }
    }
}

/// Minority oversampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoteConfig {
    pub k_neighbors: usize,
    /// Falls back to the run seed when unset
    pub seed: Option<u64>,
}

impl Default for SmoteConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 5,
            seed: None,
        }
    }
}

/// One candidate family. A grid with a single entry is trained as-is; longer
/// grids go through cross-validated search first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub name: String,
    pub grid: Vec<ModelSpec>,
}

impl CandidateConfig {
    pub fn fixed(name: impl Into<String>, spec: ModelSpec) -> Self {
        Self {
            name: name.into(),
            grid: vec![spec],
        }
    }

    pub fn grid(name: impl Into<String>, grid: Vec<ModelSpec>) -> Self {
        Self {
            name: name.into(),
            grid,
        }
    }

    pub fn is_searched(&self) -> bool {
        self.grid.len() > 1
    }
}

/// Voting ensemble over already-trained candidates, referenced by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingPlan {
    pub name: String,
    pub strategy: VotingStrategy,
    pub members: Vec<String>,
}

/// Stacking ensemble with its own base learners and meta-learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingPlan {
    pub name: String,
    pub bases: Vec<StackingBase>,
    pub meta: ModelSpec,
    #[serde(default)]
    pub config: StackingConfig,
}

/// Optional artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub feature_importance: bool,
    pub test_predictions: bool,
    pub summary_report: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            feature_importance: true,
            test_predictions: true,
            summary_report: true,
        }
    }
}

/// Every parameter of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub profile: Profile,
    /// Feature columns in training order
    pub features: Vec<String>,
    pub label: String,
    pub test_fraction: f64,
    pub seed: u64,
    /// Oversampling of the training split, off when `None`
    pub smote: Option<SmoteConfig>,
    pub candidates: Vec<CandidateConfig>,
    pub voting: Option<VotingPlan>,
    pub stacking: Option<StackingPlan>,
    pub selection_metric: Metric,
    /// Folds for hyperparameter search
    pub cv_folds: usize,
    pub artifact_dir: PathBuf,
    pub export: ExportOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Artifact root from `READMISSION_MODELS_DIR`, defaulting to `models`
pub fn default_models_dir() -> PathBuf {
    std::env::var(MODELS_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models"))
}

impl PipelineConfig {
    fn base(profile: Profile) -> Self {
        Self {
            profile,
            features: default_features(),
            label: DEFAULT_LABEL.to_string(),
            test_fraction: 0.2,
            seed: 42,
            smote: None,
            candidates: Vec::new(),
            voting: None,
            stacking: None,
            selection_metric: Metric::F1,
            cv_folds: 5,
            artifact_dir: default_models_dir(),
            export: ExportOptions::default(),
        }
    }

    /// Grid-searched logistic regression, random forest and XGBoost, selected by F1
    pub fn baseline() -> Self {
        let mut lr_grid = Vec::new();
        for c in [0.01, 0.1, 1.0, 10.0] {
            for max_iter in [100, 1000] {
                lr_grid.push(ModelSpec::LogisticRegression(
                    LogisticConfig::default().with_c(c).with_max_iter(max_iter),
                ));
            }
        }

        let mut rf_grid = Vec::new();
        for n_estimators in [100, 200] {
            for max_depth in [None, Some(10), Some(20)] {
                for min_samples_split in [2, 5, 10] {
                    for min_samples_leaf in [1, 2, 4] {
                        rf_grid.push(ModelSpec::RandomForest(
                            RandomForestConfig::default()
                                .with_n_estimators(n_estimators)
                                .with_max_depth(max_depth)
                                .with_min_samples_split(min_samples_split)
                                .with_min_samples_leaf(min_samples_leaf),
                        ));
                    }
                }
            }
        }

        let mut xgb_grid = Vec::new();
        for n_estimators in [100, 200] {
            for learning_rate in [0.01, 0.1] {
                for max_depth in [3, 5, 7] {
                    for subsample in [0.8, 1.0] {
                        for colsample in [0.8, 1.0] {
                            xgb_grid.push(ModelSpec::XGBoost(
                                XGBoostConfig::default()
                                    .with_n_estimators(n_estimators)
                                    .with_learning_rate(learning_rate)
                                    .with_max_depth(max_depth)
                                    .with_subsample(subsample)
                                    .with_colsample_bytree(colsample),
                            ));
                        }
                    }
                }
            }
        }

        Self {
            candidates: vec![
                CandidateConfig::grid("Logistic Regression", lr_grid),
                CandidateConfig::grid("Random Forest", rf_grid),
                CandidateConfig::grid("XGBoost", xgb_grid),
            ],
            ..Self::base(Profile::Baseline)
        }
    }

    /// SMOTE, five fixed-hyperparameter families plus voting and stacking
    /// ensembles, selected by accuracy
    pub fn advanced() -> Self {
        let mlp = MLPConfig::default()
            .with_hidden_layers(vec![100, 50])
            .with_activation(Activation::Relu)
            .with_alpha(1e-4)
            .with_max_iter(500);
        let gb = GradientBoostingConfig::default()
            .with_n_estimators(200)
            .with_learning_rate(0.1)
            .with_max_depth(5)
            .with_min_samples_split(5)
            .with_min_samples_leaf(2)
            .with_subsample(0.8);
        let svm = SVMConfig::default()
            .with_c(10.0)
            .with_kernel(KernelType::RbfScale)
            .with_probability(true);
        let xgb = XGBoostConfig::default()
            .with_n_estimators(200)
            .with_learning_rate(0.1)
            .with_max_depth(5)
            .with_subsample(0.8)
            .with_colsample_bytree(0.8)
            .with_gamma(1.0)
            .with_min_child_weight(5.0);
        let rf = RandomForestConfig::default()
            .with_n_estimators(200)
            .with_max_depth(Some(10))
            .with_min_samples_split(5)
            .with_min_samples_leaf(2)
            .with_max_features(MaxFeatures::Sqrt);

        let stacking_bases = vec![
            StackingBase {
                name: "gb".to_string(),
                spec: ModelSpec::GradientBoosting(GradientBoostingConfig::default().with_n_estimators(100)),
            },
            StackingBase {
                name: "xgb".to_string(),
                spec: ModelSpec::XGBoost(XGBoostConfig::default().with_n_estimators(100)),
            },
            StackingBase {
                name: "rf".to_string(),
                spec: ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(100)),
            },
            StackingBase {
                name: "mlp".to_string(),
                spec: ModelSpec::NeuralNetwork(
                    MLPConfig::default().with_hidden_layers(vec![50]).with_max_iter(300),
                ),
            },
        ];

        Self {
            smote: Some(SmoteConfig::default()),
            candidates: vec![
                CandidateConfig::fixed("Neural Network", ModelSpec::NeuralNetwork(mlp)),
                CandidateConfig::fixed("Gradient Boosting", ModelSpec::GradientBoosting(gb)),
                CandidateConfig::fixed("SVM", ModelSpec::Svm(svm)),
                CandidateConfig::fixed("XGBoost", ModelSpec::XGBoost(xgb)),
                CandidateConfig::fixed("Random Forest", ModelSpec::RandomForest(rf)),
            ],
            voting: Some(VotingPlan {
                name: "Voting Ensemble".to_string(),
                strategy: VotingStrategy::Soft,
                members: vec![
                    "Gradient Boosting".to_string(),
                    "XGBoost".to_string(),
                    "Random Forest".to_string(),
                    "Neural Network".to_string(),
                ],
            }),
            stacking: Some(StackingPlan {
                name: "Stacking Ensemble".to_string(),
                bases: stacking_bases,
                meta: ModelSpec::XGBoost(XGBoostConfig::default().with_n_estimators(100)),
                config: StackingConfig::default(),
            }),
            selection_metric: Metric::Accuracy,
            artifact_dir: default_models_dir().join("advanced"),
            ..Self::base(Profile::Advanced)
        }
    }

    /// Set the run seed. SMOTE and stacking folds follow it unless they pin their own.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.selection_metric = metric;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<CandidateConfig>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Number of report rows a run produces
    pub fn n_candidates(&self) -> usize {
        self.candidates.len() + usize::from(self.voting.is_some()) + usize::from(self.stacking.is_some())
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(PipelineError::ConfigError("feature list is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for f in &self.features {
            if !seen.insert(f.as_str()) {
                return Err(PipelineError::ConfigError(format!("duplicate feature '{}'", f)));
            }
        }
        if seen.contains(self.label.as_str()) {
            return Err(PipelineError::ConfigError(format!(
                "label '{}' is also listed as a feature",
                self.label
            )));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PipelineError::InvalidParameter {
                name: "test_fraction".to_string(),
                value: self.test_fraction.to_string(),
                reason: "must be in (0, 1)".to_string(),
            });
        }
        if self.cv_folds < 2 {
            return Err(PipelineError::InvalidParameter {
                name: "cv_folds".to_string(),
                value: self.cv_folds.to_string(),
                reason: "need at least 2 folds".to_string(),
            });
        }
        if self.candidates.is_empty() {
            return Err(PipelineError::ConfigError("no candidates configured".to_string()));
        }

        let mut names = HashSet::new();
        for c in &self.candidates {
            if c.grid.is_empty() {
                return Err(PipelineError::ConfigError(format!(
                    "candidate '{}' has an empty grid",
                    c.name
                )));
            }
            if !names.insert(c.name.as_str()) {
                return Err(PipelineError::ConfigError(format!("duplicate candidate '{}'", c.name)));
            }
        }

        if let Some(voting) = &self.voting {
            if voting.members.is_empty() {
                return Err(PipelineError::ConfigError("voting ensemble has no members".to_string()));
            }
            if let Some(missing) = voting.members.iter().find(|m| !names.contains(m.as_str())) {
                return Err(PipelineError::ConfigError(format!(
                    "voting member '{}' is not a configured candidate",
                    missing
                )));
            }
            if !names.insert(voting.name.as_str()) {
                return Err(PipelineError::ConfigError(format!("duplicate candidate '{}'", voting.name)));
            }
        }

        if let Some(stacking) = &self.stacking {
            if stacking.bases.is_empty() {
                return Err(PipelineError::ConfigError("stacking ensemble has no base learners".to_string()));
            }
            if stacking.config.n_folds < 2 {
                return Err(PipelineError::InvalidParameter {
                    name: "stacking.n_folds".to_string(),
                    value: stacking.config.n_folds.to_string(),
                    reason: "need at least 2 folds".to_string(),
                });
            }
            if !names.insert(stacking.name.as_str()) {
                return Err(PipelineError::ConfigError(format!(
                    "duplicate candidate '{}'",
                    stacking.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_validate() {
        let baseline = PipelineConfig::baseline();
        baseline.validate().unwrap();
        assert_eq!(baseline.selection_metric, Metric::F1);
        assert!(baseline.smote.is_none());
        assert_eq!(baseline.candidates[0].grid.len(), 8);
        assert_eq!(baseline.candidates[1].grid.len(), 54);
        assert_eq!(baseline.candidates[2].grid.len(), 48);
        assert_eq!(baseline.n_candidates(), 3);

        let advanced = PipelineConfig::advanced();
        advanced.validate().unwrap();
        assert_eq!(advanced.selection_metric, Metric::Accuracy);
        assert!(advanced.smote.is_some());
        assert_eq!(advanced.n_candidates(), 7);
        assert!(advanced.artifact_dir.ends_with("advanced"));
    }

    #[test]
    fn test_json_round_trip_and_partial_input() {
        let config = PipelineConfig::advanced().with_seed(7);
        let back: PipelineConfig = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);

        let partial: PipelineConfig = serde_json::from_str(r#"{"seed": 9, "selection_metric": "auc"}"#).unwrap();
        assert_eq!(partial.seed, 9);
        assert_eq!(partial.selection_metric, Metric::Auc);
        assert_eq!(partial.stacking, None);

        let edited: PipelineConfig = serde_json::from_str(&config.to_json().unwrap().replace("\"seed\": 7", "\"seed\": 11")).unwrap();
        assert_eq!(edited.seed, 11);
        assert_eq!(edited.stacking.unwrap().config.seed, None);
        assert_eq!(partial.features.len(), 16);
    }

    #[test]
    fn test_validate_rejects_unknown_voting_member() {
        let mut config = PipelineConfig::advanced();
        if let Some(voting) = config.voting.as_mut() {
            voting.members.push("KNN".to_string());
        }
        assert!(matches!(config.validate(), Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_label_as_feature() {
        let mut config = PipelineConfig::baseline();
        config.features.push(config.label.clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("Advanced".parse::<Profile>().unwrap(), Profile::Advanced);
        assert!("turbo".parse::<Profile>().is_err());
        assert_eq!(Profile::Baseline.config().profile, Profile::Baseline);
    }
}
