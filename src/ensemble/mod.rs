//! Ensemble methods module
//!
//! Two composition strategies with distinct ownership:
//! - Voting shares already-trained, frozen single-model candidates
//! - Stacking owns fresh base learners trained only inside its own folds

mod voting;
mod stacking;

pub use voting::{VotingClassifier, VotingMember, VotingStrategy};
pub use stacking::{StackingBase, StackingClassifier, StackingConfig};

use crate::error::Result;
use crate::training::{Model, ModelSpec};
use ndarray::{Array1, Array2};

/// Builds voting and stacking ensembles
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleBuilder;

impl EnsembleBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Combine trained members; nothing is refit
    pub fn voting(&self, members: Vec<VotingMember>, strategy: VotingStrategy) -> Result<VotingClassifier> {
        VotingClassifier::new(members, strategy)
    }

    /// Train a stacking ensemble on the training split
    pub fn stacking(
        &self,
        bases: Vec<StackingBase>,
        meta: ModelSpec,
        config: StackingConfig,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
    ) -> Result<StackingClassifier> {
        let mut stack = StackingClassifier::new(bases, meta, config);
        stack.fit(x_train, y_train)?;
        Ok(stack)
    }
}
