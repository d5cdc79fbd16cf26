//! End-to-end readmission training pipeline
//!
//! One sequential pass: load, split, scale, optionally oversample, train and
//! evaluate every candidate, build ensembles, select a champion, persist.
//! Every failure is tagged with the stage that produced it.

mod config;

pub use config::{
    default_models_dir, CandidateConfig, ExportOptions, PipelineConfig, Profile, SmoteConfig,
    StackingPlan, VotingPlan, MODELS_DIR_ENV,
};

use crate::data::{load_csv, FeatureTable};
use crate::ensemble::{EnsembleBuilder, VotingMember};
use crate::error::{PipelineError, PipelineStage, Result, StageContext};
use crate::evaluation::{Evaluator, MetricsRecord};
use crate::export::{
    comparison_frame, importance_frame, ArtifactBundle, ArtifactStore, ChampionArtifact, RunManifest,
    RunSummary,
};
use crate::preprocessing::{FeatureScaler, ScalingParameters};
use crate::selection::{CandidateFailure, CandidateModel, ModelCandidate, ModelSelector, Selection};
use crate::synthetic::{Sampler, SMOTE};
use crate::training::{GridSearch, Model, ModelTrainer, SearchResult, TrainedModel};
use chrono::Utc;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Number of features listed in the summary report
const TOP_FEATURES: usize = 10;

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub profile: Profile,
    pub feature_names: Vec<String>,
    pub n_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Positive rate of the training split before oversampling
    pub train_positive_rate: f64,
    pub synthetic_rows: Option<usize>,
    pub scaler: ScalingParameters,
    /// Candidates in training order, ensembles last
    pub candidates: Vec<ModelCandidate>,
    /// Configured candidates that failed and were left out of selection
    pub failures: Vec<CandidateFailure>,
    pub selection: Selection,
    /// Champion feature importances, highest first
    pub importances: Vec<(String, f64)>,
    /// Unscaled test rows with actual and predicted labels
    pub test_predictions: DataFrame,
    pub manifest: Option<RunManifest>,
}

impl PipelineReport {
    pub fn records(&self) -> Vec<MetricsRecord> {
        self.candidates.iter().map(|c| c.metrics.clone()).collect()
    }

    pub fn champion(&self) -> &ModelCandidate {
        &self.candidates[self.selection.index]
    }

    pub fn champion_artifact(&self) -> ChampionArtifact {
        let champion = self.champion();
        ChampionArtifact {
            id: champion.id.clone(),
            kind: champion.kind,
            hyperparameters: champion.hyperparameters.clone(),
            model: champion.model.clone(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            generated_at: Utc::now(),
            profile: self.profile.to_string(),
            n_rows: self.n_rows,
            n_features: self.feature_names.len(),
            train_rows: self.train_rows,
            test_rows: self.test_rows,
            train_positive_rate: self.train_positive_rate,
            synthetic_rows: self.synthetic_rows,
            selection_metric: self.selection.metric,
            champion: self.champion().id.clone(),
            champion_score: self.selection.score,
            records: self.records(),
            failures: self.failures.clone(),
            top_features: self.importances.iter().take(TOP_FEATURES).cloned().collect(),
        }
    }
}

/// Runs one configured pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load a CSV, train and persist
    pub fn run_csv(&self, path: &Path) -> Result<PipelineReport> {
        let df = load_csv(path).in_stage(PipelineStage::Load)?;
        self.run(&df)
    }

    /// Train on `df` and persist the artifacts
    pub fn run(&self, df: &DataFrame) -> Result<PipelineReport> {
        let mut report = self.fit(df)?;
        let manifest = self.persist(&report)?;
        report.manifest = Some(manifest);
        Ok(report)
    }

    /// Train, evaluate and select without writing anything
    pub fn fit(&self, df: &DataFrame) -> Result<PipelineReport> {
        let start = Instant::now();
        let cfg = &self.config;
        info!(
            profile = %cfg.profile,
            rows = df.height(),
            candidates = cfg.n_candidates(),
            metric = %cfg.selection_metric,
            "Starting pipeline"
        );

        let table = FeatureTable::from_frame(df, &cfg.features, &cfg.label).in_stage(PipelineStage::Load)?;
        let split = table
            .train_test_split(cfg.test_fraction, cfg.seed)
            .in_stage(PipelineStage::Split)?;
        let train_positive_rate = positive_rate(&split.y_train);

        let mut scaler = FeatureScaler::new();
        let x_train = scaler
            .fit_transform(&split.x_train, table.feature_names())
            .in_stage(PipelineStage::Scale)?;
        let x_test = scaler.transform(&split.x_test).in_stage(PipelineStage::Scale)?;
        let params = scaler
            .params()
            .cloned()
            .ok_or(PipelineError::ModelNotFitted)
            .in_stage(PipelineStage::Scale)?;

        let (x_fit, y_fit, synthetic_rows) = match &cfg.smote {
            Some(smote) => {
                let sampler = SMOTE::new()
                    .with_k_neighbors(smote.k_neighbors)
                    .with_seed(smote.seed.unwrap_or(cfg.seed));
                let resampled = sampler
                    .resample(&x_train, &split.y_train)
                    .in_stage(PipelineStage::Resample)?;
                let (negatives, positives) = resampled.class_balance();
                info!(
                    synthetic = resampled.n_synthetic,
                    negatives,
                    positives,
                    "Training split oversampled"
                );
                (resampled.x, resampled.y, Some(resampled.n_synthetic))
            }
            None => (x_train, split.y_train.clone(), None),
        };

        let mut candidates = Vec::with_capacity(cfg.n_candidates());
        let mut failures = Vec::new();
        for candidate in &cfg.candidates {
            match self.train_candidate(candidate, &x_fit, &y_fit, &x_test, &split.y_test) {
                Ok(trained) => candidates.push(trained),
                Err(err) => failures.push(candidate_failed(&candidate.name, &err)),
            }
        }

        if let Some(plan) = &cfg.voting {
            match self.voting_candidate(plan, &candidates, &x_test, &split.y_test) {
                Ok(voting) => candidates.push(voting),
                Err(err) => failures.push(candidate_failed(&plan.name, &err)),
            }
        }

        if let Some(plan) = &cfg.stacking {
            match self.stacking_candidate(plan, &x_fit, &y_fit, &x_test, &split.y_test) {
                Ok(stacking) => candidates.push(stacking),
                Err(err) => failures.push(candidate_failed(&plan.name, &err)),
            }
        }

        let records: Vec<MetricsRecord> = candidates.iter().map(|c| c.metrics.clone()).collect();
        let selection = ModelSelector::new(cfg.selection_metric)
            .select(&records)
            .in_stage(PipelineStage::Select)?;
        let champion = &candidates[selection.index];

        let importances = importance_ranking(&champion.model, table.feature_names());
        let test_predictions = prediction_frame(
            table.feature_names(),
            &split.x_test,
            &split.y_test,
            &champion.model,
            &x_test,
        )
        .in_stage(PipelineStage::Evaluate)?;

        let non_converged: Vec<&str> = records
            .iter()
            .filter(|r| !r.converged)
            .map(|r| r.model_id.as_str())
            .collect();
        if !non_converged.is_empty() {
            warn!(models = ?non_converged, "Some candidates did not converge");
        }
        info!(
            champion = %champion.id,
            score = selection.score,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline finished"
        );

        Ok(PipelineReport {
            profile: cfg.profile,
            feature_names: table.feature_names().to_vec(),
            n_rows: table.n_rows(),
            train_rows: split.train_indices.len(),
            test_rows: split.test_indices.len(),
            train_positive_rate,
            synthetic_rows,
            scaler: params,
            candidates,
            failures,
            selection,
            importances,
            test_predictions,
            manifest: None,
        })
    }

    /// Write the artifact directory for a finished run
    pub fn persist(&self, report: &PipelineReport) -> Result<RunManifest> {
        let cfg = &self.config;
        let champion = report.champion_artifact();
        let records = report.records();

        let importances = if cfg.export.feature_importance && !report.importances.is_empty() {
            Some(importance_frame(&report.importances).in_stage(PipelineStage::Persist)?)
        } else {
            None
        };
        let bundle = ArtifactBundle {
            scaler: &report.scaler,
            champion: &champion,
            comparison: comparison_frame(&records).in_stage(PipelineStage::Persist)?,
            importances,
            test_predictions: cfg.export.test_predictions.then(|| report.test_predictions.clone()),
            report: cfg.export.summary_report.then(|| report.summary().to_markdown()),
            selection_metric: report.selection.metric,
            selection_score: report.selection.score,
            seed: cfg.seed,
        };

        ArtifactStore::new(&cfg.artifact_dir)
            .persist(bundle)
            .in_stage(PipelineStage::Persist)
    }

    fn train_candidate(
        &self,
        candidate: &CandidateConfig,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<ModelCandidate> {
        let seed = self.config.seed;
        let grid: Vec<_> = candidate.grid.iter().cloned().map(|s| s.seeded(seed)).collect();

        let (spec, search) = if candidate.is_searched() {
            let result = GridSearch::new()
                .with_n_splits(self.config.cv_folds)
                .with_seed(seed)
                .search(&grid, x, y)
                .in_stage(PipelineStage::Search)?;
            info!(
                candidate = %candidate.name,
                grid = grid.len(),
                best = %result.best_spec().describe(),
                cv_score = result.best_score(),
                "Hyperparameters selected"
            );
            (result.best_spec().clone(), Some(result))
        } else {
            let spec = grid.first().cloned().ok_or_else(|| {
                PipelineError::ConfigError(format!("candidate '{}' has an empty grid", candidate.name))
            })?;
            (spec, None)
        };

        let model = ModelTrainer::new(spec.clone())
            .fit(x, y)
            .in_stage(PipelineStage::Train)?;
        self.evaluate_candidate(
            &candidate.name,
            spec.describe(),
            CandidateModel::Single(Arc::new(model)),
            search,
            x_test,
            y_test,
        )
    }

    /// Soft or hard voting over the already trained members. Members whose
    /// own training failed are left out.
    fn voting_candidate(
        &self,
        plan: &VotingPlan,
        candidates: &[ModelCandidate],
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<ModelCandidate> {
        let mut members = Vec::with_capacity(plan.members.len());
        for name in &plan.members {
            match shared_model(candidates, name) {
                Some(model) => members.push(VotingMember { name: name.clone(), model }),
                None => warn!(ensemble = %plan.name, member = %name, "Voting member unavailable; skipped"),
            }
        }
        if members.is_empty() {
            return Err(PipelineError::TrainingError(format!(
                "none of the members of '{}' trained",
                plan.name
            )))
            .in_stage(PipelineStage::Ensemble);
        }

        let voting = EnsembleBuilder::new()
            .voting(members, plan.strategy)
            .in_stage(PipelineStage::Ensemble)?;
        let hyperparameters = format!(
            "{:?} voting over {}",
            voting.strategy(),
            voting.member_names().join(", ")
        );
        self.evaluate_candidate(
            &plan.name,
            hyperparameters,
            CandidateModel::Voting(voting),
            None,
            x_test,
            y_test,
        )
    }

    /// Stacking with freshly initialized bases. Folds follow the run seed
    /// unless the plan pins its own.
    fn stacking_candidate(
        &self,
        plan: &StackingPlan,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<ModelCandidate> {
        let seed = self.config.seed;
        let bases = plan
            .bases
            .iter()
            .cloned()
            .map(|mut b| {
                b.spec = b.spec.seeded(seed);
                b
            })
            .collect::<Vec<_>>();
        let mut config = plan.config.clone();
        config.seed = Some(config.seed.unwrap_or(seed));

        let stacking = EnsembleBuilder::new()
            .stacking(bases, plan.meta.clone().seeded(seed), config, x, y)
            .in_stage(PipelineStage::Ensemble)?;
        let hyperparameters = format!(
            "bases [{}], meta {}, {} folds",
            stacking.base_names().join(", "),
            stacking.meta_spec(),
            stacking.config().n_folds
        );
        self.evaluate_candidate(
            &plan.name,
            hyperparameters,
            CandidateModel::Stacking(stacking),
            None,
            x_test,
            y_test,
        )
    }

    fn evaluate_candidate(
        &self,
        name: &str,
        hyperparameters: String,
        model: CandidateModel,
        search: Option<SearchResult>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<ModelCandidate> {
        let kind = model.kind();
        let metrics = Evaluator::new()
            .evaluate(name, kind, &model, x_test, y_test)
            .in_stage(PipelineStage::Evaluate)?;
        Ok(ModelCandidate {
            id: name.to_string(),
            kind,
            hyperparameters,
            model,
            metrics,
            search,
        })
    }
}

fn positive_rate(y: &Array1<f64>) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    y.iter().filter(|&&v| v == 1.0).count() as f64 / y.len() as f64
}

/// The trained single model behind a named candidate
fn shared_model(candidates: &[ModelCandidate], name: &str) -> Option<Arc<TrainedModel>> {
    candidates
        .iter()
        .find(|c| c.id == name)
        .and_then(|c| match &c.model {
            CandidateModel::Single(model) => Some(Arc::clone(model)),
            _ => None,
        })
}

fn candidate_failed(name: &str, err: &PipelineError) -> CandidateFailure {
    warn!(candidate = name, stage = ?err.stage(), error = %err, "Candidate failed; continuing without it");
    CandidateFailure::new(name, err)
}

/// (feature, importance) pairs sorted descending; empty when the model has none
fn importance_ranking(model: &CandidateModel, features: &[String]) -> Vec<(String, f64)> {
    let Some(importances) = model.feature_importances() else {
        debug!(model = %model.kind(), "Champion exposes no feature importances");
        return Vec::new();
    };
    if importances.len() != features.len() {
        warn!(
            expected = features.len(),
            actual = importances.len(),
            "Importance vector length does not match feature count"
        );
        return Vec::new();
    }

    let mut ranking: Vec<(String, f64)> = features.iter().cloned().zip(importances.iter().copied()).collect();
    ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranking
}

fn prediction_frame(
    features: &[String],
    x_raw: &Array2<f64>,
    y_true: &Array1<f64>,
    model: &CandidateModel,
    x_scaled: &Array2<f64>,
) -> Result<DataFrame> {
    let predicted = model.predict(x_scaled)?;
    let proba = model.predict_proba(x_scaled)?;

    let mut columns: Vec<Column> = features
        .iter()
        .enumerate()
        .map(|(j, name)| Column::new(name.as_str().into(), x_raw.column(j).to_vec()))
        .collect();
    columns.push(Column::new(
        "actual".into(),
        y_true.iter().map(|&v| v as i64).collect::<Vec<i64>>(),
    ));
    columns.push(Column::new(
        "predicted".into(),
        predicted.iter().map(|&v| v as i64).collect::<Vec<i64>>(),
    ));
    if let Some(p) = proba {
        columns.push(Column::new("probability".into(), p.to_vec()));
    }
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{default_features, synthetic_table, DEFAULT_LABEL};
    use crate::evaluation::Metric;
    use crate::training::{LogisticConfig, ModelSpec, RandomForestConfig, SVMConfig};

    fn small_config(dir: &Path) -> PipelineConfig {
        PipelineConfig::baseline()
            .with_candidates(vec![
                CandidateConfig::fixed("Logistic Regression", ModelSpec::LogisticRegression(LogisticConfig::default())),
                CandidateConfig::fixed(
                    "Random Forest",
                    ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(15)),
                ),
                CandidateConfig::fixed("SVM", ModelSpec::Svm(SVMConfig::default().with_probability(false))),
            ])
            .with_artifact_dir(dir.join("models"))
    }

    fn table(rows: usize) -> DataFrame {
        synthetic_table(rows, &default_features(), DEFAULT_LABEL, 0.2, 42).unwrap()
    }

    #[test]
    fn test_fit_reports_every_candidate() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(small_config(tmp.path())).unwrap();
        let report = pipeline.fit(&table(300)).unwrap();

        assert_eq!(report.candidates.len(), 3);
        assert_eq!(report.test_rows, 60);
        assert_eq!(report.feature_names, default_features());
        // Label-only SVM gets no AUC and no probability column
        assert!(report.candidates[2].metrics.auc.is_none());
        assert!(report.manifest.is_none());
        assert!(!tmp.path().join("models").exists());
    }

    #[test]
    fn test_missing_feature_fails_in_load_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = small_config(tmp.path());
        config.features.push("hba1c_trend".to_string());
        let err = Pipeline::new(config).unwrap().fit(&table(100)).unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::Load));
    }

    #[test]
    fn test_smote_only_touches_training_split() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = small_config(tmp.path());
        config.smote = Some(SmoteConfig::default());
        let report = Pipeline::new(config).unwrap().fit(&table(300)).unwrap();

        assert!(report.synthetic_rows.unwrap() > 0);
        assert_eq!(report.test_predictions.height(), report.test_rows);
        assert!(report.candidates.iter().all(|c| c.metrics.n_samples == 60));
    }

    #[test]
    fn test_failed_candidate_is_recorded_and_the_run_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::baseline()
            .with_candidates(vec![
                CandidateConfig::fixed("Logistic Regression", ModelSpec::LogisticRegression(LogisticConfig::default())),
                CandidateConfig::fixed("SVM", ModelSpec::Svm(SVMConfig::default().with_max_samples(1))),
            ])
            .with_artifact_dir(tmp.path().join("models"));
        config.voting = Some(VotingPlan {
            name: "Voting Ensemble".to_string(),
            strategy: crate::ensemble::VotingStrategy::Soft,
            members: vec!["Logistic Regression".to_string(), "SVM".to_string()],
        });

        let report = Pipeline::new(config).unwrap().run(&table(200)).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "SVM");
        assert_eq!(report.failures[0].stage, Some(PipelineStage::Train));
        assert!(report.failures[0].reason.contains("max_samples"));

        let ids: Vec<&str> = report.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["Logistic Regression", "Voting Ensemble"]);
        match &report.candidates[1].model {
            CandidateModel::Voting(v) => assert_eq!(v.member_names(), vec!["Logistic Regression"]),
            other => panic!("expected voting, got {:?}", other.kind()),
        }
        assert!(report.summary().to_markdown().contains("**SVM:** failed during train"));
        assert!(report.manifest.is_some());
    }

    #[test]
    fn test_every_candidate_failing_stops_at_selection() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::baseline()
            .with_candidates(vec![CandidateConfig::fixed(
                "SVM",
                ModelSpec::Svm(SVMConfig::default().with_max_samples(0)),
            )])
            .with_artifact_dir(tmp.path().join("models"));
        let err = Pipeline::new(config).unwrap().fit(&table(100)).unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::Select));
    }

    #[test]
    fn test_stacking_folds_follow_the_run_seed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = small_config(tmp.path());
        config.stacking = Some(StackingPlan {
            name: "Stacking Ensemble".to_string(),
            bases: vec![crate::ensemble::StackingBase {
                name: "lr".to_string(),
                spec: ModelSpec::LogisticRegression(LogisticConfig::default()),
            }],
            meta: ModelSpec::LogisticRegression(LogisticConfig::default()),
            config: crate::ensemble::StackingConfig::default(),
        });
        config.seed = 7;

        let report = Pipeline::new(config).unwrap().fit(&table(200)).unwrap();
        let stacking = report.candidates.last().unwrap();
        match &stacking.model {
            CandidateModel::Stacking(s) => assert_eq!(s.config().seed, Some(7)),
            other => panic!("expected stacking, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_auc_selection_skips_label_only_models() {
        let tmp = tempfile::tempdir().unwrap();
        let config = small_config(tmp.path()).with_metric(Metric::Auc);
        let report = Pipeline::new(config).unwrap().fit(&table(200)).unwrap();
        assert_ne!(report.champion().id, "SVM");
    }
}
