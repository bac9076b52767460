use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::artifacts::{write_bundle, ArtifactPaths};
use crate::balance::{rebalance, BalanceScope};
use crate::calibrate::CalibratedModel;
use crate::config::PipelineConfig;
use crate::csv_reader::read_transactions;
use crate::dataset::TransactionSet;
use crate::error::Result;
use crate::evaluate::{evaluate, EvaluationReport};
use crate::inference::{FraudModel, InferenceBundle};
use crate::model::{select_model, ModelSelection};
use crate::scaler::StandardScaler;
use crate::split::stratified_split;

/// What a completed run produced. Reports are for display only and are not persisted.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub selection: ModelSelection,
    pub raw_report: EvaluationReport,
    pub calibrated_report: Option<EvaluationReport>,
    pub bundle: InferenceBundle,
    pub train_counts: [usize; 2],
    pub test_counts: [usize; 2],
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub outcome: TrainingOutcome,
    pub artifacts: ArtifactPaths,
}

// Everything after loading: balance, split, scale, select, evaluate, calibrate.
// Inputs: a loaded dataset and the run configuration
// Outputs: TrainingOutcome holding the bundle that would be persisted
// Key steps:
// 1. Balance the full set or, by default, only the training split
// 2. Stratified train/test split
// 3. Fit the scaler on the training split, apply it to both
// 4. Grid search, then score the raw model on the test split
// 5. Calibrate with the winning C and score again
pub fn train(data: &TransactionSet, config: &PipelineConfig) -> Result<TrainingOutcome> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let data = match config.balance.scope {
        BalanceScope::FullDataset => rebalance(data, &config.balance, &mut rng)?,
        BalanceScope::TrainOnly => data.clone(),
    };

    let (train_rows, test_rows) = stratified_split(data.labels(), config.test_fraction, &mut rng)?;
    let mut train = data.select(&train_rows);
    let test = data.select(&test_rows);
    if config.balance.scope == BalanceScope::TrainOnly {
        train = rebalance(&train, &config.balance, &mut rng)?;
    }
    train.require_both_classes("training split")?;
    info!(train = train.len(), test = test.len(), "split transactions");

    let scaler = StandardScaler::fit(train.records())?;
    let x_train = scaler.transform(train.records())?;
    let x_test = scaler.transform(test.records())?;

    let selection = select_model(x_train.view(), train.labels(), &config.model, &mut rng)?;
    let threshold = config.calibration.threshold;
    let raw_probabilities = selection.model.predict_proba(x_test.view())?;
    let raw_predictions = selection.model.predict(x_test.view(), threshold)?;
    let raw_report = evaluate(test.labels(), raw_predictions.view(), Some(raw_probabilities.view()))?;
    info!(accuracy = raw_report.accuracy, "evaluated selected model");

    let (model, calibrated_report) = if config.calibration.enabled {
        let calibrated = CalibratedModel::fit(
            x_train.view(),
            train.labels(),
            selection.best_c,
            &config.model,
            config.calibration.folds,
            &mut rng,
        )?;
        let probabilities = calibrated.predict_proba(x_test.view())?;
        let predictions = calibrated.predict(x_test.view(), threshold)?;
        let report = evaluate(test.labels(), predictions.view(), Some(probabilities.view()))?;
        info!(accuracy = report.accuracy, "evaluated calibrated model");
        (FraudModel::Calibrated(calibrated), Some(report))
    } else {
        (FraudModel::Logistic(selection.model.clone()), None)
    };

    let bundle = InferenceBundle::new(model, scaler, data.features().to_vec())?;
    Ok(TrainingOutcome {
        selection,
        raw_report,
        calibrated_report,
        bundle,
        train_counts: train.class_counts(),
        test_counts: test.class_counts(),
    })
}

/// Full run from raw CSV to artifacts on disk. Nothing is written unless every stage succeeds.
pub fn run(config: &PipelineConfig) -> Result<PipelineRun> {
    let data = read_transactions(&config.inputs, &config.schema, config.missing_columns)?;
    let outcome = train(&data, config)?;
    let artifacts = write_bundle(&config.output_dir, &outcome.bundle)?;
    Ok(PipelineRun { outcome, artifacts })
}
