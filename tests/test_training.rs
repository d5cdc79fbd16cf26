//! Integration test: Classifier families, search, ensembles and selection

use ndarray::{Array1, Array2};
use readmission_automl::data::{default_features, synthetic_table, FeatureTable, DEFAULT_LABEL};
use readmission_automl::ensemble::{EnsembleBuilder, StackingBase, StackingConfig, VotingMember, VotingStrategy};
use readmission_automl::evaluation::{Evaluator, Metric};
use readmission_automl::preprocessing::FeatureScaler;
use readmission_automl::selection::ModelSelector;
use readmission_automl::training::{
    Activation, GradientBoostingConfig, GridSearch, KernelType, LogisticConfig, MLPConfig, Model,
    ModelKind, ModelSpec, ModelTrainer, RandomForestConfig, SVMConfig, XGBoostConfig,
};
use std::sync::Arc;

struct Prepared {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
}

fn prepared(rows: usize, positive_rate: f64) -> Prepared {
    let df = synthetic_table(rows, &default_features(), DEFAULT_LABEL, positive_rate, 42).unwrap();
    let table = FeatureTable::from_frame(&df, &default_features(), DEFAULT_LABEL).unwrap();
    let split = table.train_test_split(0.2, 42).unwrap();
    let mut scaler = FeatureScaler::new();
    Prepared {
        x_train: scaler.fit_transform(&split.x_train, table.feature_names()).unwrap(),
        x_test: scaler.transform(&split.x_test).unwrap(),
        y_train: split.y_train,
        y_test: split.y_test,
    }
}

fn families() -> Vec<ModelSpec> {
    vec![
        ModelSpec::LogisticRegression(LogisticConfig::default()),
        ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(25).with_random_state(42)),
        ModelSpec::GradientBoosting(GradientBoostingConfig::default().with_n_estimators(40).with_random_state(42)),
        ModelSpec::XGBoost(XGBoostConfig::default().with_n_estimators(40).with_random_state(42)),
        ModelSpec::Svm(SVMConfig::default().with_kernel(KernelType::RbfScale).with_max_iter(200)),
        ModelSpec::NeuralNetwork(
            MLPConfig::default()
                .with_hidden_layers(vec![16])
                .with_activation(Activation::Tanh)
                .with_max_iter(300)
                .with_random_state(42),
        ),
    ]
}

#[test]
fn test_every_family_learns_the_signal() {
    let data = prepared(600, 0.3);
    let evaluator = Evaluator::new();

    for spec in families() {
        let kind = spec.kind();
        let model = ModelTrainer::new(spec).fit(&data.x_train, &data.y_train).unwrap();
        let record = evaluator
            .evaluate(kind.display_name(), kind, &model, &data.x_test, &data.y_test)
            .unwrap();
        assert!(record.accuracy > 0.8, "{} accuracy {}", kind, record.accuracy);
        assert!(record.auc.is_some(), "{} should expose probabilities", kind);
    }
}

#[test]
fn test_non_convergence_is_a_flag_not_an_error() {
    let data = prepared(300, 0.3);
    let spec = ModelSpec::NeuralNetwork(MLPConfig::default().with_hidden_layers(vec![8]).with_max_iter(1));
    let model = ModelTrainer::new(spec).fit(&data.x_train, &data.y_train).unwrap();
    assert!(!model.converged());

    let record = Evaluator::new()
        .evaluate("Neural Network", ModelKind::NeuralNetwork, &model, &data.x_test, &data.y_test)
        .unwrap();
    assert!(!record.converged);
    assert_eq!(record.caveats().len(), 1);
}

#[test]
fn test_label_only_svm_has_no_auc() {
    let data = prepared(300, 0.3);
    let model = ModelTrainer::new(ModelSpec::Svm(SVMConfig::default().with_probability(false)))
        .fit(&data.x_train, &data.y_train)
        .unwrap();
    let record = Evaluator::new()
        .evaluate("SVM", ModelKind::Svm, &model, &data.x_test, &data.y_test)
        .unwrap();
    assert!(record.auc.is_none());
    assert_eq!(record.value(Metric::Auc), None);
}

#[test]
fn test_grid_search_prefers_first_of_equal_entries() {
    let data = prepared(300, 0.3);
    let spec = ModelSpec::LogisticRegression(LogisticConfig::default());
    let result = GridSearch::new()
        .search(&[spec.clone(), spec.clone(), spec], &data.x_train, &data.y_train)
        .unwrap();
    assert_eq!(result.best_index, 0);
    assert_eq!(result.entries.len(), 3);
    assert!(result.entries.iter().all(|e| e.cv.n_folds == 5));
}

#[test]
fn test_ensembles_compete_with_their_members() {
    let data = prepared(500, 0.3);
    let evaluator = Evaluator::new();
    let builder = EnsembleBuilder::new();

    let rf = Arc::new(
        ModelTrainer::new(ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(20)))
            .fit(&data.x_train, &data.y_train)
            .unwrap(),
    );
    let lr = Arc::new(
        ModelTrainer::new(ModelSpec::LogisticRegression(LogisticConfig::default()))
            .fit(&data.x_train, &data.y_train)
            .unwrap(),
    );

    let voting = builder
        .voting(
            vec![
                VotingMember { name: "Random Forest".to_string(), model: Arc::clone(&rf) },
                VotingMember { name: "Logistic Regression".to_string(), model: Arc::clone(&lr) },
            ],
            VotingStrategy::Soft,
        )
        .unwrap();
    let stacking = builder
        .stacking(
            vec![
                StackingBase {
                    name: "rf".to_string(),
                    spec: ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(20)),
                },
                StackingBase {
                    name: "lr".to_string(),
                    spec: ModelSpec::LogisticRegression(LogisticConfig::default()),
                },
            ],
            ModelSpec::LogisticRegression(LogisticConfig::default()),
            StackingConfig::default(),
            &data.x_train,
            &data.y_train,
        )
        .unwrap();

    let records = vec![
        evaluator.evaluate("Random Forest", ModelKind::RandomForest, rf.as_ref(), &data.x_test, &data.y_test).unwrap(),
        evaluator.evaluate("Logistic Regression", ModelKind::LogisticRegression, lr.as_ref(), &data.x_test, &data.y_test).unwrap(),
        evaluator.evaluate("Voting Ensemble", ModelKind::VotingEnsemble, &voting, &data.x_test, &data.y_test).unwrap(),
        evaluator.evaluate("Stacking Ensemble", ModelKind::StackingEnsemble, &stacking, &data.x_test, &data.y_test).unwrap(),
    ];
    assert!(records.iter().all(|r| r.accuracy > 0.8));

    let selector = ModelSelector::new(Metric::Accuracy);
    let first = selector.select(&records).unwrap();
    let second = selector.select(&records).unwrap();
    assert_eq!(first, second);
    assert_eq!(selector.rank(&records)[0], first.index);
}
