//! Readmission CLI Module
//!
//! Command-line interface for training, prediction and data inspection.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{default_features, load_csv, synthetic_table, DEFAULT_LABEL};
use crate::evaluation::Metric;
use crate::inference::Predictor;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineReport, Profile};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn show_help() {
    section("Commands");

    let cmds: &[(&str, &str)] = &[
        ("readmission train -d data.csv", "Baseline profile, chosen by F1"),
        ("readmission train -d data.csv -p advanced", "SMOTE + ensembles, chosen by accuracy"),
        ("readmission predict -a models -d new.csv", "Score rows with a saved champion"),
        ("readmission config -p advanced", "Print a profile as JSON"),
        ("readmission demo", "Run on a synthetic table"),
        ("readmission info -d data.csv", "Inspect a dataset"),
    ];

    for (cmd, desc) in cmds {
        println!("  {:<44} {}", cmd.white(), muted(desc));
    }
    println!();
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "readmission")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hospital readmission risk model training and scoring")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train, compare and persist readmission models
    Train {
        /// Cleaned encounter table (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Built-in profile (baseline, advanced)
        #[arg(short, long, default_value = "baseline")]
        profile: String,

        /// JSON config file; replaces the profile
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Selection metric (accuracy, precision, recall, f1, auc)
        #[arg(short, long)]
        metric: Option<String>,

        /// Artifact directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Score a table with a persisted champion
    Predict {
        /// Artifact directory written by `train`
        #[arg(short, long)]
        artifacts: PathBuf,

        /// Input data file (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Output predictions file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print a profile's configuration as JSON
    Config {
        #[arg(short, long, default_value = "baseline")]
        profile: String,
    },

    /// Run a profile on a synthetic table
    Demo {
        /// Number of synthetic rows
        #[arg(short, long, default_value = "1000")]
        rows: usize,

        #[arg(short, long, default_value = "baseline")]
        profile: String,

        /// Artifact directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show data information
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,

        /// Label column
        #[arg(short, long, default_value = DEFAULT_LABEL)]
        label: String,
    },
}

/// Entry point used by the binary
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Train { data, profile, config, metric, output, seed }) => {
            cmd_train(&data, &profile, config.as_deref(), metric.as_deref(), output, seed)
        }
        Some(Commands::Predict { artifacts, data, output }) => {
            cmd_predict(&artifacts, &data, output.as_deref())
        }
        Some(Commands::Config { profile }) => cmd_config(&profile),
        Some(Commands::Demo { rows, profile, output }) => cmd_demo(rows, &profile, output),
        Some(Commands::Info { data, label }) => cmd_info(&data, &label),
        None => {
            show_help();
            Ok(())
        }
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn resolve_config(
    profile: &str,
    config_path: Option<&Path>,
    metric: Option<&str>,
    output: Option<PathBuf>,
    seed: Option<u64>,
) -> anyhow::Result<PipelineConfig> {
    let mut config = match config_path {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => profile.parse::<Profile>()?.config(),
    };
    if let Some(metric) = metric {
        config = config.with_metric(metric.parse::<Metric>()?);
    }
    if let Some(dir) = output {
        config = config.with_artifact_dir(dir);
    }
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    Ok(config)
}

pub fn cmd_train(
    data_path: &Path,
    profile: &str,
    config_path: Option<&Path>,
    metric: Option<&str>,
    output: Option<PathBuf>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    section("Train");

    let config = resolve_config(profile, config_path, metric, output, seed)?;

    step_run("Loading data");
    let start = Instant::now();
    let df = load_csv(data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    train_and_report(config, &df)
}

fn train_and_report(config: PipelineConfig, df: &DataFrame) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config)?;
    step_run(&format!(
        "Training {} candidates ({} profile)",
        pipeline.config().n_candidates(),
        pipeline.config().profile.to_string().cyan()
    ));
    let start = Instant::now();
    let report = pipeline.run(df)?;
    step_done(&format!("{:.1?}", start.elapsed()));

    print_comparison(&report);
    println!(
        "  {:<16} {}",
        muted("Artifacts"),
        pipeline.config().artifact_dir.display().to_string().white()
    );
    println!();
    Ok(())
}

fn print_comparison(report: &PipelineReport) {
    section("Results");
    println!(
        "  {:<22} {:>9} {:>9} {:>9} {:>9} {:>9}",
        muted("Model"), muted("Accuracy"), muted("Precision"), muted("Recall"), muted("F1"), muted("AUC")
    );
    println!("  {}", dim(&"─".repeat(72)));

    for (i, candidate) in report.candidates.iter().enumerate() {
        let m = &candidate.metrics;
        let auc = m.auc.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v));
        let name = if m.converged {
            candidate.id.clone()
        } else {
            format!("{}*", candidate.id)
        };
        let line = format!(
            "  {:<22} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9}",
            name, m.accuracy, m.precision, m.recall, m.f1, auc
        );
        if i == report.selection.index {
            println!("{}", line.white().bold());
        } else {
            println!("{}", line);
        }
    }
    println!("  {}", dim(&"─".repeat(72)));

    if report.candidates.iter().any(|c| !c.metrics.converged) {
        println!("  {}", dim("* did not converge within its iteration cap"));
    }
    for failure in &report.failures {
        println!("  {:<22} {} {}", failure.id, "failed".red(), dim(&failure.reason));
    }

    let champion = report.champion();
    println!();
    println!(
        "  {} {} {} {:.4}",
        ok("champion"),
        champion.id.white().bold(),
        muted(&format!("{}:", report.selection.metric)),
        report.selection.score
    );
    println!("  {:<16} {}", muted("Parameters"), champion.hyperparameters);
}

pub fn cmd_predict(artifacts: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading champion");
    let predictor = Predictor::load(artifacts)?;
    step_done(&format!("{} ({})", predictor.champion_id(), predictor.champion_kind()));

    step_run("Loading data");
    let df = load_csv(data_path)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    let features = df.select(predictor.feature_names().iter().map(|s| s.as_str()))?;

    step_run("Scoring");
    let start = Instant::now();
    let results = predictor.predict_frame(&features)?;
    step_done(&format!("{:?}", start.elapsed()));

    let positives = results.iter().filter(|r| r.label == 1).count();
    println!();
    println!("  {:<16} {}", muted("Rows"), results.len());
    println!(
        "  {:<16} {} ({:.1}%)",
        muted("Readmissions"),
        positives.to_string().white().bold(),
        100.0 * positives as f64 / results.len().max(1) as f64
    );

    if let Some(path) = output {
        let mut out = df.clone();
        out.with_column(Column::new(
            "predicted".into(),
            results.iter().map(|r| r.label as i64).collect::<Vec<i64>>(),
        ))?;
        if predictor.has_proba() {
            out.with_column(Column::new(
                "probability".into(),
                results.iter().map(|r| r.probability).collect::<Vec<Option<f64>>>(),
            ))?;
        }
        let mut file = std::fs::File::create(path)?;
        CsvWriter::new(&mut file).finish(&mut out)?;
        println!("  {:<16} {}", muted("Output"), path.display());
    }

    println!();
    Ok(())
}

pub fn cmd_config(profile: &str) -> anyhow::Result<()> {
    let config = profile.parse::<Profile>()?.config();
    println!("{}", config.to_json()?);
    Ok(())
}

pub fn cmd_demo(rows: usize, profile: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    section("Demo");

    let config = resolve_config(profile, None, None, output, None)?;

    step_run("Generating synthetic encounters");
    let df = synthetic_table(rows, &default_features(), DEFAULT_LABEL, 0.1, config.seed)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    train_and_report(config, &df)
}

pub fn cmd_info(data_path: &Path, label: &str) -> anyhow::Result<()> {
    section("Data Info");

    let df = load_csv(data_path)?;

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), df.height());
    println!("  {:<12} {}", muted("Columns"), df.width());

    if let Ok(column) = df.column(label) {
        let values = column.as_materialized_series().cast(&DataType::Float64)?;
        let positives = values.f64()?.into_iter().filter(|v| *v == Some(1.0)).count();
        println!(
            "  {:<12} {} positive / {} total ({:.2}%)",
            muted("Label"),
            positives,
            df.height(),
            100.0 * positives as f64 / df.height().max(1) as f64
        );
    } else {
        println!("  {:<12} {}", muted("Label"), format!("'{}' not found", label).yellow());
    }
    println!();

    println!(
        "  {:<34} {:<10} {:>6} {:>12} {:>12}",
        muted("Column"), muted("Type"), muted("Nulls"), muted("Mean"), muted("Std")
    );
    println!("  {}", dim(&"─".repeat(78)));

    for col in df.get_columns() {
        let series = col.as_materialized_series();
        let numeric = series.dtype().is_float() || series.dtype().is_integer();
        let (mean, std) = if numeric {
            (
                series.mean().map_or_else(|| "-".to_string(), |v| format!("{:.4}", v)),
                series.std(0).map_or_else(|| "-".to_string(), |v| format!("{:.4}", v)),
            )
        } else {
            ("-".to_string(), "-".to_string())
        };
        println!(
            "  {:<34} {:<10} {:>6} {:>12} {:>12}",
            col.name(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count(),
            mean,
            std
        );
    }

    println!();
    Ok(())
}
