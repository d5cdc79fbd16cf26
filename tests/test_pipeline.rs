//! Integration test: Full pipeline (load → split → scale → SMOTE → train → ensemble → select → persist → predict)

use readmission_automl::data::{default_features, synthetic_table, DEFAULT_LABEL};
use readmission_automl::ensemble::{StackingBase, StackingConfig, VotingStrategy};
use readmission_automl::evaluation::Metric;
use readmission_automl::export::{ArtifactStore, COMPARISON_COLUMNS, MANIFEST_FILE, PREDICTIONS_FILE};
use readmission_automl::inference::Predictor;
use readmission_automl::pipeline::{
    CandidateConfig, Pipeline, PipelineConfig, SmoteConfig, StackingPlan, VotingPlan,
};
use readmission_automl::training::{
    GradientBoostingConfig, LogisticConfig, MLPConfig, ModelKind, ModelSpec, RandomForestConfig,
    SVMConfig, XGBoostConfig,
};
use readmission_automl::PipelineStage;
use std::path::Path;

fn encounters(rows: usize) -> polars::prelude::DataFrame {
    synthetic_table(rows, &default_features(), DEFAULT_LABEL, 0.1, 42).unwrap()
}

/// Advanced profile shape with smaller models
fn reduced_advanced(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::advanced()
        .with_candidates(vec![
            CandidateConfig::fixed(
                "Neural Network",
                ModelSpec::NeuralNetwork(MLPConfig::default().with_hidden_layers(vec![32]).with_max_iter(100)),
            ),
            CandidateConfig::fixed(
                "Gradient Boosting",
                ModelSpec::GradientBoosting(GradientBoostingConfig::default().with_n_estimators(30)),
            ),
            CandidateConfig::fixed("SVM", ModelSpec::Svm(SVMConfig::default().with_c(10.0).with_max_iter(200))),
            CandidateConfig::fixed(
                "XGBoost",
                ModelSpec::XGBoost(XGBoostConfig::default().with_n_estimators(30)),
            ),
            CandidateConfig::fixed(
                "Random Forest",
                ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(30).with_max_depth(Some(10))),
            ),
        ])
        .with_artifact_dir(dir.join("models"));

    config.voting = Some(VotingPlan {
        name: "Voting Ensemble".to_string(),
        strategy: VotingStrategy::Soft,
        members: vec![
            "Gradient Boosting".to_string(),
            "XGBoost".to_string(),
            "Random Forest".to_string(),
            "Neural Network".to_string(),
        ],
    });
    config.stacking = Some(StackingPlan {
        name: "Stacking Ensemble".to_string(),
        bases: vec![
            StackingBase {
                name: "rf".to_string(),
                spec: ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(20)),
            },
            StackingBase {
                name: "lr".to_string(),
                spec: ModelSpec::LogisticRegression(LogisticConfig::default()),
            },
        ],
        meta: ModelSpec::LogisticRegression(LogisticConfig::default()),
        config: StackingConfig::default(),
    });
    config
}

fn quick(dir: &Path) -> PipelineConfig {
    PipelineConfig::baseline()
        .with_candidates(vec![
            CandidateConfig::fixed("Logistic Regression", ModelSpec::LogisticRegression(LogisticConfig::default())),
            CandidateConfig::fixed(
                "Random Forest",
                ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(20)),
            ),
        ])
        .with_artifact_dir(dir.join("models"))
}

#[test]
fn test_end_to_end_synthetic_encounters() {
    let tmp = tempfile::tempdir().unwrap();
    let config = reduced_advanced(tmp.path());
    let expected_rows = config.n_candidates();
    let pipeline = Pipeline::new(config).unwrap();

    let report = pipeline.run(&encounters(1000)).unwrap();

    // One comparison row per classifier plus each ensemble
    assert_eq!(expected_rows, 7);
    assert_eq!(report.candidates.len(), expected_rows);
    assert_eq!(report.candidates[5].kind, ModelKind::VotingEnsemble);
    assert_eq!(report.candidates[6].kind, ModelKind::StackingEnsemble);

    // Every candidate must reach the majority-class baseline (about 0.90) within a small tolerance
    let actual = report.test_predictions.column("actual").unwrap().i64().unwrap();
    let test_positive_rate = actual.into_no_null_iter().filter(|&v| v == 1).count() as f64 / actual.len() as f64;
    let baseline = test_positive_rate.max(1.0 - test_positive_rate);
    assert!(baseline > 0.85);
    for c in &report.candidates {
        let m = &c.metrics;
        assert!(m.accuracy >= baseline - 0.02, "{} accuracy {} vs baseline {}", c.id, m.accuracy, baseline);
        for v in [m.accuracy, m.precision, m.recall, m.f1] {
            assert!((0.0..=1.0).contains(&v));
        }
        if m.precision + m.recall > 0.0 {
            let f1 = 2.0 * m.precision * m.recall / (m.precision + m.recall);
            assert!((m.f1 - f1).abs() < 1e-12);
        }
    }

    // Oversampling touched the training split only
    assert!(report.synthetic_rows.unwrap() > 0);
    assert_eq!(report.test_rows, 200);
    assert!(report.candidates.iter().all(|c| c.metrics.n_samples == 200));

    let store = ArtifactStore::new(tmp.path().join("models"));
    assert_eq!(store.load_features().unwrap(), default_features());
    let comparison = store.load_comparison().unwrap();
    assert_eq!(comparison.height(), expected_rows);
    assert_eq!(comparison.get_column_names_str(), COMPARISON_COLUMNS.to_vec());

    let manifest = store.load_manifest().unwrap();
    assert_eq!(manifest.files.last().map(String::as_str), Some(MANIFEST_FILE));
    assert_eq!(manifest.selection_metric, Metric::Accuracy);
    assert_eq!(manifest.champion_id, report.champion().id);
    assert!(manifest.files.iter().any(|f| f == PREDICTIONS_FILE));
    assert!(report.failures.is_empty());
}

#[test]
fn test_svm_trains_on_large_oversampled_split() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::baseline()
        .with_candidates(vec![
            CandidateConfig::fixed("Logistic Regression", ModelSpec::LogisticRegression(LogisticConfig::default())),
            CandidateConfig::fixed("SVM", ModelSpec::Svm(SVMConfig::default().with_max_iter(1))),
        ])
        .with_artifact_dir(tmp.path().join("models"));
    config.smote = Some(SmoteConfig::default());

    let report = Pipeline::new(config).unwrap().fit(&encounters(7500)).unwrap();

    // Oversampling doubles the majority class of 6000 training rows
    assert!(report.train_rows + report.synthetic_rows.unwrap() > 10_000);
    assert!(report.failures.is_empty());
    assert_eq!(report.candidates.len(), 2);

    let svm = &report.candidates[1].metrics;
    assert_eq!(svm.kind, ModelKind::Svm);
    assert!(svm.auc.is_some());
    assert!(svm.caveats().iter().any(|c| c.contains("stratified subsample of")));
    assert!(report.summary().to_markdown().contains("stratified subsample of"));
}

#[test]
fn test_persisted_champion_reproduces_test_predictions() {
    let tmp = tempfile::tempdir().unwrap();
    let report = Pipeline::new(quick(tmp.path())).unwrap().run(&encounters(400)).unwrap();

    let predictor = Predictor::load(tmp.path().join("models")).unwrap();
    assert_eq!(predictor.champion_id(), report.champion().id);

    let features = report
        .test_predictions
        .select(default_features())
        .unwrap();
    let results = predictor.predict_frame(&features).unwrap();

    let expected: Vec<i64> = report
        .test_predictions
        .column("predicted")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    let actual: Vec<i64> = results.iter().map(|r| r.label as i64).collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_fixed_seed_runs_are_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = quick(tmp.path());
    config.smote = Some(SmoteConfig::default());
    let pipeline = Pipeline::new(config).unwrap();

    let df = encounters(300);
    let a = pipeline.fit(&df).unwrap();
    let b = pipeline.fit(&df).unwrap();

    assert_eq!(a.records(), b.records());
    assert_eq!(a.selection, b.selection);
    assert_eq!(a.scaler, b.scaler);
    assert_eq!(a.synthetic_rows, b.synthetic_rows);
}

#[test]
fn test_grid_search_runs_for_multi_entry_grids() {
    let tmp = tempfile::tempdir().unwrap();
    let config = PipelineConfig::baseline()
        .with_candidates(vec![
            CandidateConfig::grid(
                "Logistic Regression",
                vec![
                    ModelSpec::LogisticRegression(LogisticConfig::default().with_c(0.01)),
                    ModelSpec::LogisticRegression(LogisticConfig::default().with_c(10.0)),
                ],
            ),
            CandidateConfig::fixed(
                "Random Forest",
                ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(10)),
            ),
        ])
        .with_artifact_dir(tmp.path().join("models"));

    let report = Pipeline::new(config).unwrap().fit(&encounters(300)).unwrap();
    let search = report.candidates[0].search.as_ref().unwrap();
    assert_eq!(search.entries.len(), 2);
    assert_eq!(search.metric, Metric::F1);
    assert!(report.candidates[1].search.is_none());

    // Champion maximizes F1, the baseline selection metric
    let best_f1 = report
        .candidates
        .iter()
        .map(|c| c.metrics.f1)
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(report.champion().metrics.f1, best_f1);
}

#[test]
fn test_persistence_failure_names_the_stage() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let config = quick(tmp.path()).with_artifact_dir(blocker.join("models"));
    let err = Pipeline::new(config).unwrap().run(&encounters(200)).unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Persist));
}
