//! Feature table loading, train/test splitting and synthetic data
//!
//! The pipeline consumes an already-cleaned table: every declared feature
//! column is numeric and complete, and the label column is binary.

mod table;
mod synthetic;

pub use table::{FeatureTable, Split, frame_to_array, load_csv};
pub use synthetic::synthetic_table;

/// Model features used by the readmission pipeline, in training order
pub const DEFAULT_FEATURES: [&str; 16] = [
    "age_numeric",
    "time_in_hospital",
    "num_lab_procedures",
    "num_procedures",
    "num_medications",
    "number_outpatient",
    "number_emergency",
    "number_inpatient",
    "number_diagnoses",
    "max_glu_serum_numeric",
    "A1Cresult_numeric",
    "gender_encoded",
    "race_encoded",
    "admission_type_id_encoded",
    "discharge_disposition_id_encoded",
    "admission_source_id_encoded",
];

/// Binary label column (1 = readmitted)
pub const DEFAULT_LABEL: &str = "readmitted_binary";

/// Owned copy of the default feature list
pub fn default_features() -> Vec<String> {
    DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect()
}
