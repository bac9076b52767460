// Command-line entry for the fraud classifier. Trains and persists the model bundle,
// scores uploaded transaction files against it, and merges raw sources.
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fraud_classifier::artifacts::load_bundle;
use fraud_classifier::balance::{BalanceScope, BalanceStrategy};
use fraud_classifier::csv_reader::{read_transactions, write_dataset};
use fraud_classifier::evaluate::EvaluationReport;
use fraud_classifier::inference::{score_upload, Scored};
use fraud_classifier::pipeline::{self, TrainingOutcome};
use fraud_classifier::{FillStrategy, PipelineConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_BUNDLE_DIR: &str = "artifacts";
const DEFAULT_LABEL: &str = "Class";
const DEFAULT_LOG_FILTER: &str = "fraud_classifier=info";

#[derive(Parser, Debug)]
#[command(name = "fraud_classifier")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Credit-card fraud classifier: train, score and merge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train, evaluate and persist model.json, scaler.json and feature_names.json
    Train(TrainArgs),
    /// Score a transaction CSV with a persisted bundle
    Predict(PredictArgs),
    /// Concatenate and mean-impute labelled sources into one CSV
    Merge(MergeArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Labelled CSV source (repeatable); replaces the configured inputs
    #[arg(long = "input")]
    inputs: Vec<PathBuf>,

    /// Directory for the persisted artifacts
    #[arg(long)]
    output: Option<PathBuf>,

    /// Class balancing: none, undersample or smote
    #[arg(long)]
    balance: Option<BalanceStrategy>,

    /// Balance the whole dataset before splitting instead of only the training split
    #[arg(long)]
    balance_full_dataset: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Persist the raw selected model instead of the calibrated one
    #[arg(long)]
    no_calibration: bool,

    /// Fail on missing feature columns instead of filling them with zeros
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// Directory holding the persisted artifacts
    #[arg(long, default_value = DEFAULT_BUNDLE_DIR)]
    bundle: PathBuf,

    /// Transaction CSV to score
    #[arg(long)]
    input: PathBuf,

    #[arg(long, default_value_t = 0.5)]
    threshold: f64,

    /// Ground-truth column used for evaluation when present
    #[arg(long, default_value = DEFAULT_LABEL)]
    label: String,

    /// Fail on missing feature columns instead of filling them with zeros
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct MergeArgs {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Labelled CSV source (repeatable)
    #[arg(long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Merged CSV to write
    #[arg(long)]
    output: PathBuf,
}

fn fill_strategy(strict: bool, configured: FillStrategy) -> FillStrategy {
    if strict {
        FillStrategy::Reject
    } else {
        configured
    }
}

// Prints one evaluation report under a heading
fn print_report(title: &str, report: &EvaluationReport) {
    println!("\n{}", title);
    println!("{}", report);
}

// Summarises a finished training run
// Inputs: the training outcome
// Outputs: Prints split sizes, grid-search scores and both evaluation reports
fn print_training_summary(outcome: &TrainingOutcome) {
    println!(
        "Training split: {} legitimate / {} fraudulent",
        outcome.train_counts[0], outcome.train_counts[1]
    );
    println!(
        "Test split: {} legitimate / {} fraudulent",
        outcome.test_counts[0], outcome.test_counts[1]
    );

    println!("\nGrid search (mean cross-validated accuracy):");
    for candidate in &outcome.selection.candidates {
        let marker = if candidate.c == outcome.selection.best_c { " <- best" } else { "" };
        println!("  C = {:<8} {:.4}{}", candidate.c, candidate.mean_accuracy, marker);
    }

    print_report("Selected model on the test split:", &outcome.raw_report);
    if let Some(report) = &outcome.calibrated_report {
        print_report("Calibrated model on the test split:", report);
    }
}

// Prints per-row predictions, the class distribution and, for labelled input, the evaluation
fn print_predictions(scored: &Scored) {
    if !scored.defaulted.is_empty() {
        println!("Filled missing columns: {}", scored.defaulted.join(", "));
    }

    println!("Predictions:");
    for (i, prediction) in scored.predictions.iter().enumerate() {
        println!(
            "Row {}: {} (Confidence: {:.2})",
            i + 1,
            prediction.describe(),
            prediction.confidence()
        );
    }

    let [legit, fraud] = scored.distribution();
    let total = scored.predictions.len().max(1) as f64;
    println!("\nPrediction Distribution:");
    println!("Not Fraudulent: {} ({:.1}%)", legit, legit as f64 / total * 100.0);
    println!("Potentially Fraudulent: {} ({:.1}%)", fraud, fraud as f64 / total * 100.0);

    if let Some(report) = &scored.evaluation {
        print_report("Against the provided labels:", report);
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let mut config = PipelineConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if !args.inputs.is_empty() {
        config.inputs = args.inputs;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(strategy) = args.balance {
        config.balance.strategy = strategy;
    }
    if args.balance_full_dataset {
        config.balance.scope = BalanceScope::FullDataset;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.no_calibration {
        config.calibration.enabled = false;
    }
    config.missing_columns = fill_strategy(args.strict, config.missing_columns);

    info!(
        inputs = config.inputs.len(),
        balance = %config.balance.strategy,
        seed = config.seed,
        "starting training run"
    );
    let run = pipeline::run(&config).context("training run failed")?;
    print_training_summary(&run.outcome);
    println!("\nArtifacts:");
    println!("  model:    {}", run.artifacts.model.display());
    println!("  scaler:   {}", run.artifacts.scaler.display());
    println!("  features: {}", run.artifacts.features.display());
    Ok(())
}

// Scoring problems are shown to the user, never turned into a failing exit.
fn run_predict(args: PredictArgs) -> Result<()> {
    let bundle = load_bundle(&args.bundle)
        .with_context(|| format!("failed to load artifacts from {}", args.bundle.display()))?;
    let bytes = fs::read(&args.input).with_context(|| format!("failed to read {}", args.input.display()))?;

    let fill = fill_strategy(args.strict, FillStrategy::Zero);
    match score_upload(&bundle, &bytes, &args.label, fill, args.threshold) {
        Ok(scored) => print_predictions(&scored),
        Err(diagnostic) => eprintln!("{}", diagnostic),
    }
    Ok(())
}

fn run_merge(args: MergeArgs) -> Result<()> {
    let config = PipelineConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    let set = read_transactions(&args.inputs, &config.schema, config.missing_columns)?;
    write_dataset(&args.output, &set, &config.schema.label)?;
    println!("Merged {} records into {}", set.len(), args.output.display());
    Ok(())
}

// RUST_LOG wins when it parses; otherwise info for this crate only.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Predict(args) => run_predict(args),
        Commands::Merge(args) => run_merge(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_respects_rust_log() {
        let filter = log_filter(Some("fraud_classifier=debug"));
        assert!(filter.to_string().contains("fraud_classifier=debug"));
        assert!(!filter.to_string().contains("fraud_classifier=info"));
    }

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter(None).to_string(), DEFAULT_LOG_FILTER);
    }
}
