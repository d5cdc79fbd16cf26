//! Voting ensemble over already-trained models

use crate::error::{PipelineError, Result};
use crate::training::{Model, TrainedModel};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Voting strategy for classification
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VotingStrategy {
    /// Hard voting: majority vote over labels
    Hard,
    /// Soft voting: average positive-class probabilities
    #[default]
    Soft,
}

/// A named, frozen ensemble member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingMember {
    pub name: String,
    pub model: Arc<TrainedModel>,
}

/// Voting classifier ensemble.
///
/// Members are shared with the single-model candidates and never refit, so a
/// member named "Random Forest" is exactly the model reported on its own row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingClassifier {
    /// Voting strategy actually in effect
    strategy: VotingStrategy,
    members: Vec<VotingMember>,
}

impl VotingClassifier {
    /// Build an ensemble from trained members.
    ///
    /// Soft voting drops members without probability output. When no member
    /// has probabilities it falls back to hard voting.
    pub fn new(members: Vec<VotingMember>, strategy: VotingStrategy) -> Result<Self> {
        if members.is_empty() {
            return Err(PipelineError::ValidationError(
                "voting ensemble needs at least one member".to_string(),
            ));
        }

        let (strategy, members) = match strategy {
            VotingStrategy::Hard => (VotingStrategy::Hard, members),
            VotingStrategy::Soft => {
                let (with_proba, without): (Vec<_>, Vec<_>) =
                    members.into_iter().partition(|m| m.model.has_proba());
                for dropped in &without {
                    warn!(member = %dropped.name, "Member has no probability output; excluded from soft voting");
                }
                if with_proba.is_empty() {
                    warn!("No member has probability output; falling back to hard voting");
                    (VotingStrategy::Hard, without)
                } else {
                    (VotingStrategy::Soft, with_proba)
                }
            }
        };

        info!(
            strategy = ?strategy,
            members = ?members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            "Voting ensemble assembled"
        );
        Ok(Self { strategy, members })
    }

    pub fn strategy(&self) -> VotingStrategy {
        self.strategy
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }

    /// Mean positive-class probability across members
    fn average_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut sum = Array1::<f64>::zeros(x.nrows());
        for member in &self.members {
            let proba = member.model.predict_proba(x)?.ok_or_else(|| {
                PipelineError::ValidationError(format!(
                    "member '{}' lost its probability output",
                    member.name
                ))
            })?;
            sum += &proba;
        }
        Ok(sum / self.members.len() as f64)
    }

    /// Fraction of members voting positive
    fn vote_share(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut votes = Array1::<f64>::zeros(x.nrows());
        for member in &self.members {
            votes += &member.model.predict(x)?;
        }
        Ok(votes / self.members.len() as f64)
    }
}

impl Model for VotingClassifier {
    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        Err(PipelineError::TrainingError(
            "voting members are frozen; assemble a new ensemble from retrained models".to_string(),
        ))
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let share = match self.strategy {
            VotingStrategy::Soft => self.average_proba(x)?,
            VotingStrategy::Hard => self.vote_share(x)?,
        };
        Ok(share.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        match self.strategy {
            VotingStrategy::Soft => self.average_proba(x).map(Some),
            VotingStrategy::Hard => Ok(None),
        }
    }

    fn has_proba(&self) -> bool {
        self.strategy == VotingStrategy::Soft
    }

    fn converged(&self) -> bool {
        self.members.iter().all(|m| m.model.converged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{LogisticConfig, ModelSpec, ModelTrainer, RandomForestConfig, SVMConfig};
    use ndarray::array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[-2.0, 0.1], [-1.5, -0.3], [-1.0, 0.2], [-0.6, 0.0], [0.6, 0.3], [1.0, -0.2], [1.5, 0.1], [2.0, 0.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    fn member(name: &str, spec: ModelSpec) -> VotingMember {
        let (x, y) = data();
        VotingMember {
            name: name.to_string(),
            model: Arc::new(ModelTrainer::new(spec).fit(&x, &y).unwrap()),
        }
    }

    #[test]
    fn test_soft_vote_averages_member_probabilities() {
        let (x, _) = data();
        let lr = member("lr", ModelSpec::LogisticRegression(LogisticConfig::default()));
        let rf = member(
            "rf",
            ModelSpec::RandomForest(RandomForestConfig::default().with_n_estimators(5).with_random_state(1)),
        );
        let expected = (lr.model.predict_proba(&x).unwrap().unwrap()
            + rf.model.predict_proba(&x).unwrap().unwrap())
            / 2.0;

        let ensemble = VotingClassifier::new(vec![lr, rf], VotingStrategy::Soft).unwrap();
        let proba = ensemble.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba, expected);
        assert_eq!(ensemble.predict(&x).unwrap(), expected.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }));
    }

    #[test]
    fn test_label_only_members_are_excluded_from_soft_vote() {
        let lr = member("lr", ModelSpec::LogisticRegression(LogisticConfig::default()));
        let svm = member("svm", ModelSpec::Svm(SVMConfig::default().with_probability(false)));
        let ensemble = VotingClassifier::new(vec![lr, svm], VotingStrategy::Soft).unwrap();
        assert_eq!(ensemble.member_names(), vec!["lr"]);
        assert!(ensemble.has_proba());
    }

    #[test]
    fn test_falls_back_to_majority_without_probabilities() {
        let (x, y) = data();
        let svm = member("svm", ModelSpec::Svm(SVMConfig::default().with_probability(false)));
        let ensemble = VotingClassifier::new(vec![svm], VotingStrategy::Soft).unwrap();
        assert_eq!(ensemble.strategy(), VotingStrategy::Hard);
        assert!(ensemble.predict_proba(&x).unwrap().is_none());
        assert_eq!(ensemble.predict(&x).unwrap().len(), y.len());
    }

    #[test]
    fn test_members_are_shared_not_copied() {
        let lr = member("lr", ModelSpec::LogisticRegression(LogisticConfig::default()));
        let shared = Arc::clone(&lr.model);
        let mut ensemble = VotingClassifier::new(vec![lr], VotingStrategy::Soft).unwrap();
        assert_eq!(Arc::strong_count(&shared), 2);

        let (x, y) = data();
        assert!(ensemble.fit(&x, &y).is_err());
    }

    #[test]
    fn test_empty_ensemble_rejected() {
        assert!(VotingClassifier::new(Vec::new(), VotingStrategy::Soft).is_err());
    }
}
