//! Comparison tables and the markdown run summary

use crate::error::Result;
use crate::evaluation::{Metric, MetricsRecord};
use crate::selection::CandidateFailure;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Column headers of the model comparison table
pub const COMPARISON_COLUMNS: [&str; 7] = [
    "Model",
    "Accuracy",
    "Precision",
    "Recall",
    "F1 Score",
    "AUC",
    "Converged",
];

/// One row per candidate, in training order. Missing AUCs are nulls.
pub fn comparison_frame(records: &[MetricsRecord]) -> Result<DataFrame> {
    let names: Vec<&str> = records.iter().map(|r| r.model_id.as_str()).collect();
    let column = |f: fn(&MetricsRecord) -> f64| records.iter().map(f).collect::<Vec<f64>>();
    let auc: Vec<Option<f64>> = records.iter().map(|r| r.auc).collect();
    let converged: Vec<bool> = records.iter().map(|r| r.converged).collect();

    let df = DataFrame::new(vec![
        Column::new(COMPARISON_COLUMNS[0].into(), names),
        Column::new(COMPARISON_COLUMNS[1].into(), column(|r| r.accuracy)),
        Column::new(COMPARISON_COLUMNS[2].into(), column(|r| r.precision)),
        Column::new(COMPARISON_COLUMNS[3].into(), column(|r| r.recall)),
        Column::new(COMPARISON_COLUMNS[4].into(), column(|r| r.f1)),
        Column::new(COMPARISON_COLUMNS[5].into(), auc),
        Column::new(COMPARISON_COLUMNS[6].into(), converged),
    ])?;
    Ok(df)
}

/// `Feature,Importance` sorted by importance, highest first
pub fn importance_frame(ranking: &[(String, f64)]) -> Result<DataFrame> {
    let features: Vec<&str> = ranking.iter().map(|(f, _)| f.as_str()).collect();
    let values: Vec<f64> = ranking.iter().map(|(_, v)| *v).collect();
    Ok(DataFrame::new(vec![
        Column::new("Feature".into(), features),
        Column::new("Importance".into(), values),
    ])?)
}

/// Facts about one pipeline run, rendered into `summary_report.md`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub profile: String,
    pub n_rows: usize,
    pub n_features: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_positive_rate: f64,
    /// Synthetic rows added by SMOTE, `None` when oversampling was off
    pub synthetic_rows: Option<usize>,
    pub selection_metric: Metric,
    pub champion: String,
    pub champion_score: f64,
    pub records: Vec<MetricsRecord>,
    /// Candidates that produced no model
    #[serde(default)]
    pub failures: Vec<CandidateFailure>,
    pub top_features: Vec<(String, f64)>,
}

impl RunSummary {
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Readmission Model Summary\n\n");
        md.push_str(&format!("*Generated: {}*\n\n", self.generated_at.format("%Y-%m-%d %H:%M UTC")));

        md.push_str("## Data\n\n");
        md.push_str(&format!("- **Profile:** {}\n", self.profile));
        md.push_str(&format!("- **Rows:** {} ({} train / {} test)\n", self.n_rows, self.train_rows, self.test_rows));
        md.push_str(&format!("- **Features:** {}\n", self.n_features));
        md.push_str(&format!("- **Training positive rate:** {:.2}%\n", self.train_positive_rate * 100.0));
        match self.synthetic_rows {
            Some(n) => md.push_str(&format!("- **SMOTE:** applied, {} synthetic rows\n\n", n)),
            None => md.push_str("- **SMOTE:** not applied\n\n"),
        }

        md.push_str("## Results\n\n");
        md.push_str("| Model | Accuracy | Precision | Recall | F1 Score | AUC |\n");
        md.push_str("|-------|----------|-----------|--------|----------|-----|\n");
        for r in &self.records {
            let auc = r.auc.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v));
            md.push_str(&format!(
                "| {} | {:.4} | {:.4} | {:.4} | {:.4} | {} |\n",
                r.model_id, r.accuracy, r.precision, r.recall, r.f1, auc
            ));
        }
        md.push('\n');

        let caveats: Vec<(&str, Vec<String>)> = self
            .records
            .iter()
            .map(|r| (r.model_id.as_str(), r.caveats()))
            .filter(|(_, c)| !c.is_empty())
            .collect();
        if !caveats.is_empty() || !self.failures.is_empty() {
            md.push_str("### Caveats\n\n");
            for (model, notes) in caveats {
                md.push_str(&format!("- **{}:** {}\n", model, notes.join("; ")));
            }
            for failure in &self.failures {
                let stage = failure.stage.map_or_else(|| "setup".to_string(), |s| s.to_string());
                md.push_str(&format!(
                    "- **{}:** failed during {}, left out of selection ({})\n",
                    failure.id, stage, failure.reason
                ));
            }
            md.push('\n');
        }

        md.push_str("## Champion\n\n");
        md.push_str(&format!(
            "**{}**, selected by {} = {:.4}\n\n",
            self.champion, self.selection_metric, self.champion_score
        ));

        if !self.top_features.is_empty() {
            md.push_str("## Top Features\n\n");
            for (i, (name, value)) in self.top_features.iter().enumerate() {
                md.push_str(&format!("{}. {} ({:.4})\n", i + 1, name, value));
            }
        }

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ModelKind;

    fn record(id: &str, auc: Option<f64>, converged: bool) -> MetricsRecord {
        MetricsRecord {
            model_id: id.to_string(),
            kind: ModelKind::Svm,
            accuracy: 0.9,
            precision: 0.5,
            recall: 0.4,
            f1: 0.444,
            auc,
            converged,
            notes: Vec::new(),
            n_samples: 200,
            roc: None,
        }
    }

    #[test]
    fn test_comparison_frame_keeps_missing_auc_as_null() {
        let df = comparison_frame(&[record("SVM", None, true), record("Random Forest", Some(0.8), true)]).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.get_column_names_str(), COMPARISON_COLUMNS.to_vec());
        assert_eq!(df.column("AUC").unwrap().null_count(), 1);
    }

    #[test]
    fn test_markdown_lists_caveats_and_champion() {
        let summary = RunSummary {
            generated_at: Utc::now(),
            profile: "advanced".to_string(),
            n_rows: 1000,
            n_features: 16,
            train_rows: 800,
            test_rows: 200,
            train_positive_rate: 0.1,
            synthetic_rows: Some(640),
            selection_metric: Metric::Accuracy,
            champion: "Random Forest".to_string(),
            champion_score: 0.95,
            records: vec![record("Neural Network", Some(0.7), false), record("Random Forest", Some(0.8), true)],
            failures: vec![CandidateFailure {
                id: "SVM".to_string(),
                stage: Some(crate::error::PipelineStage::Train),
                reason: "Training error: SVM requires both classes in the training data".to_string(),
            }],
            top_features: vec![("age_numeric".to_string(), 0.3)],
        };
        let md = summary.to_markdown();
        assert!(md.contains("640 synthetic rows"));
        assert!(md.contains("**Neural Network:** did not converge"));
        assert!(md.contains("**SVM:** failed during train, left out of selection"));
        assert!(md.contains("**Random Forest**, selected by accuracy"));
        assert!(md.contains("1. age_numeric"));
    }
}
