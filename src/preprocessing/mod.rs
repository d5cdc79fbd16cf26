//! Feature preprocessing
//!
//! Standard scaling fit on the training split only. The fitted
//! [`ScalingParameters`] are immutable and shared by every trainer.

mod scaler;

pub use scaler::{FeatureScaler, ScalingParameters};
