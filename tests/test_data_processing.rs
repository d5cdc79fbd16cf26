//! Integration test: Data loading, splitting, scaling and oversampling

use readmission_automl::data::{default_features, load_csv, synthetic_table, FeatureTable, DEFAULT_LABEL};
use readmission_automl::preprocessing::FeatureScaler;
use readmission_automl::synthetic::{class_counts, Sampler, SMOTE};
use readmission_automl::PipelineError;
use ndarray::Axis;
use polars::prelude::*;

fn encounters_df() -> DataFrame {
    df!(
        "age_numeric" => &[45.0, 65.0, 75.0, 55.0, 85.0, 35.0, 70.0, 60.0, 50.0, 80.0],
        "time_in_hospital" => &[3i64, 7, 2, 5, 9, 1, 4, 6, 2, 8],
        "gender_encoded" => &[0i64, 1, 1, 0, 1, 0, 0, 1, 1, 0],
        "payer_code" => &["MC", "HM", "MC", "SP", "MC", "BC", "MC", "HM", "SP", "MC"],
        "readmitted_binary" => &[0i64, 1, 0, 0, 1, 0, 0, 1, 0, 1]
    )
    .unwrap()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_integer_columns_are_accepted_in_requested_order() {
    let df = encounters_df();
    let features = names(&["gender_encoded", "age_numeric", "time_in_hospital"]);
    let table = FeatureTable::from_frame(&df, &features, "readmitted_binary").unwrap();

    assert_eq!(table.feature_names(), features.as_slice());
    assert_eq!(table.x()[[1, 0]], 1.0);
    assert_eq!(table.x()[[1, 1]], 65.0);
    assert_eq!(table.x()[[1, 2]], 7.0);
    assert!((table.positive_rate() - 0.4).abs() < 1e-12);
}

#[test]
fn test_input_errors_name_the_column() {
    let df = encounters_df();

    let missing = FeatureTable::from_frame(&df, &names(&["num_medications"]), "readmitted_binary");
    assert!(matches!(missing, Err(PipelineError::FeatureNotFound(ref c)) if c == "num_medications"));

    let text = FeatureTable::from_frame(&df, &names(&["payer_code"]), "readmitted_binary");
    assert!(matches!(text, Err(PipelineError::NonNumericFeature(ref c)) if c == "payer_code"));

    let label = FeatureTable::from_frame(&df, &names(&["age_numeric"]), "time_in_hospital");
    assert!(matches!(label, Err(PipelineError::InvalidLabel(_))));
}

#[test]
fn test_csv_round_trip_through_loader() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("encounters.csv");
    let mut df = synthetic_table(120, &default_features(), DEFAULT_LABEL, 0.1, 42).unwrap();
    let mut file = std::fs::File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(&mut df).unwrap();

    let loaded = load_csv(&path).unwrap();
    assert_eq!(loaded.height(), 120);

    let table = FeatureTable::from_csv(&path, &default_features(), DEFAULT_LABEL).unwrap();
    assert_eq!(table.n_features(), 16);
    assert_eq!(table.y().sum() as usize, 12);

    assert!(matches!(
        load_csv(&tmp.path().join("absent.csv")),
        Err(PipelineError::DataError(_))
    ));
}

#[test]
fn test_split_scale_resample_chain() {
    let df = synthetic_table(500, &default_features(), DEFAULT_LABEL, 0.1, 42).unwrap();
    let table = FeatureTable::from_frame(&df, &default_features(), DEFAULT_LABEL).unwrap();

    let split = table.train_test_split(0.2, 42).unwrap();
    assert_eq!(split.test_indices.len(), 100);
    assert_eq!(split.train_indices.len(), 400);

    let again = table.train_test_split(0.2, 42).unwrap();
    assert_eq!(split.test_indices, again.test_indices);

    let mut scaler = FeatureScaler::new();
    let x_train = scaler.fit_transform(&split.x_train, table.feature_names()).unwrap();
    for col in x_train.axis_iter(Axis(1)) {
        let mean = col.mean().unwrap();
        let std = col.std(0.0);
        assert!(mean.abs() < 1e-9);
        assert!((std - 1.0).abs() < 1e-9);
    }

    let resampled = SMOTE::new().with_seed(42).resample(&x_train, &split.y_train).unwrap();
    let counts = class_counts(&resampled.y);
    assert_eq!(counts[&0], counts[&1]);
    assert_eq!(resampled.x.nrows(), 400 + resampled.n_synthetic);

    let repeat = SMOTE::new().with_seed(42).resample(&x_train, &split.y_train).unwrap();
    assert_eq!(resampled.x, repeat.x);
}
