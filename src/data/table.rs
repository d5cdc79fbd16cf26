//! Feature table and seeded train/test split

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::Path;
use tracing::{debug, info};

/// Read a CSV file with a header row
pub fn load_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(PipelineError::DataError(format!(
            "input file not found: {}",
            path.display()
        )));
    }

    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(1000))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    debug!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded CSV");
    Ok(df)
}

/// Ordered numeric feature columns plus a binary label
#[derive(Debug, Clone)]
pub struct FeatureTable {
    feature_names: Vec<String>,
    x: Array2<f64>,
    y: Array1<f64>,
}

impl FeatureTable {
    /// Build a table from arrays, validating shape and labels
    pub fn new(feature_names: Vec<String>, x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        if x.ncols() != feature_names.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} feature columns", feature_names.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if let Some((row, v)) = y.iter().enumerate().find(|(_, &v)| v != 0.0 && v != 1.0) {
            return Err(PipelineError::InvalidLabel(format!(
                "row {} has label {}, expected 0 or 1",
                row, v
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::DataError(
                "feature matrix contains non-finite values".to_string(),
            ));
        }

        Ok(Self { feature_names, x, y })
    }

    /// Extract `features` (in that order) and `label` from a data frame
    pub fn from_frame(df: &DataFrame, features: &[String], label: &str) -> Result<Self> {
        let x = frame_to_array(df, features)?;
        let y = Array1::from_vec(numeric_column(df, label)?);

        let table = Self::new(features.to_vec(), x, y)?;
        info!(
            rows = table.n_rows(),
            features = table.n_features(),
            positive_rate = table.positive_rate(),
            "Feature table ready"
        );
        Ok(table)
    }

    /// Read a CSV file and extract the table
    pub fn from_csv(path: &Path, features: &[String], label: &str) -> Result<Self> {
        let df = load_csv(path)?;
        Self::from_frame(&df, features, label)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Fraction of rows labelled positive
    pub fn positive_rate(&self) -> f64 {
        if self.y.is_empty() {
            return 0.0;
        }
        self.y.sum() / self.y.len() as f64
    }

    /// Seeded shuffle split; the test part gets `ceil(n * test_fraction)` rows
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> Result<Split> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(PipelineError::InvalidParameter {
                name: "test_fraction".to_string(),
                value: test_fraction.to_string(),
                reason: "must be in (0, 1)".to_string(),
            });
        }

        let n = self.n_rows();
        let n_test = (n as f64 * test_fraction).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(PipelineError::ValidationError(format!(
                "cannot split {} rows with test fraction {}",
                n, test_fraction
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let test_indices = indices[..n_test].to_vec();
        let train_indices = indices[n_test..].to_vec();

        let split = Split {
            x_train: self.x.select(Axis(0), &train_indices),
            y_train: self.y.select(Axis(0), &train_indices),
            x_test: self.x.select(Axis(0), &test_indices),
            y_test: self.y.select(Axis(0), &test_indices),
            train_indices,
            test_indices,
        };

        info!(
            train = split.train_indices.len(),
            test = split.test_indices.len(),
            seed,
            "Split table"
        );
        Ok(split)
    }
}

/// Disjoint train/test partition of a feature table
#[derive(Debug, Clone)]
pub struct Split {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
}

/// Extract named numeric columns, in order, as a row-major matrix
pub fn frame_to_array(df: &DataFrame, features: &[String]) -> Result<Array2<f64>> {
    let col_data: Vec<Vec<f64>> = features
        .iter()
        .map(|name| numeric_column(df, name))
        .collect::<Result<Vec<_>>>()?;

    // Row-major build from column-major polars data
    Ok(Array2::from_shape_fn((df.height(), features.len()), |(r, c)| col_data[c][r]))
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::FeatureNotFound(name.to_string()))?;

    let dtype = column.dtype();
    if !(dtype.is_float() || dtype.is_integer() || *dtype == DataType::Boolean) {
        return Err(PipelineError::NonNumericFeature(name.to_string()));
    }

    let series = column.as_materialized_series();
    if series.null_count() > 0 {
        return Err(PipelineError::DataError(format!(
            "column '{}' has {} missing values",
            name,
            series.null_count()
        )));
    }

    let values = series.cast(&DataType::Float64)?;
    let values: Vec<f64> = values
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}
