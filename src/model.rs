use linfa::traits::Fit;
use linfa::Dataset;
use linfa_logistic::LogisticRegression;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{FRAUDULENT, LEGITIMATE};
use crate::error::{FraudError, Result};
use crate::split::stratified_folds;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Candidate inverse regularisation strengths, searched in order.
    pub c_grid: Vec<f64>,
    pub cv_folds: usize,
    pub max_iterations: u64,
    pub gradient_tolerance: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams {
            c_grid: vec![0.01, 0.1, 1.0, 10.0, 100.0],
            cv_folds: 5,
            max_iterations: 1000,
            gradient_tolerance: 1e-4,
        }
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

pub fn accuracy(truth: ArrayView1<'_, usize>, predicted: ArrayView1<'_, usize>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth.iter().zip(predicted.iter()).filter(|(t, p)| t == p).count();
    correct as f64 / truth.len() as f64
}

/// L2-regularised logistic regression, oriented so that
/// `sigmoid(coefficients . x + intercept)` is the probability of fraud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    coefficients: Vec<f64>,
    intercept: f64,
    c: f64,
}

impl LogisticModel {
    pub fn from_parts(coefficients: Vec<f64>, intercept: f64, c: f64) -> Self {
        LogisticModel {
            coefficients,
            intercept,
            c,
        }
    }

    pub fn fit(
        records: ArrayView2<'_, f64>,
        labels: ArrayView1<'_, usize>,
        c: f64,
        params: &ModelParams,
    ) -> Result<Self> {
        let fraud = labels.iter().filter(|&&l| l == FRAUDULENT).count();
        if fraud == 0 || fraud == labels.len() {
            return Err(FraudError::DegenerateSplit(format!(
                "{} records of a single class",
                labels.len()
            )));
        }
        let dataset = Dataset::new(records.to_owned(), labels.to_owned());
        let fitted = LogisticRegression::default()
            .alpha(1.0 / c)
            .max_iterations(params.max_iterations)
            .gradient_tolerance(params.gradient_tolerance)
            .fit(&dataset)
            .map_err(|e| FraudError::Fit(e.to_string()))?;

        // linfa reports probabilities for its own "positive" class; flip the
        // hyperplane when that is the legitimate class.
        let sign = if fitted.labels().pos.class == FRAUDULENT {
            1.0
        } else {
            -1.0
        };
        Ok(LogisticModel {
            coefficients: fitted.params().iter().map(|w| w * sign).collect(),
            intercept: fitted.intercept() * sign,
            c,
        })
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub(crate) fn check_width(&self, records: &ArrayView2<'_, f64>) -> Result<()> {
        if records.ncols() != self.n_features() {
            return Err(FraudError::ShapeMismatch {
                expected: self.n_features(),
                actual: records.ncols(),
            });
        }
        Ok(())
    }

    /// Signed distance from the decision boundary, `w . x + b`.
    pub fn decision_function(&self, records: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.check_width(&records)?;
        let weights = ArrayView1::from(&self.coefficients[..]);
        Ok(records.dot(&weights) + self.intercept)
    }

    pub fn predict_proba(&self, records: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(records)?.mapv(sigmoid))
    }

    pub fn predict(&self, records: ArrayView2<'_, f64>, threshold: f64) -> Result<Array1<usize>> {
        Ok(self
            .predict_proba(records)?
            .mapv(|p| if p >= threshold { FRAUDULENT } else { LEGITIMATE }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub c: f64,
    pub fold_accuracies: Vec<f64>,
    pub mean_accuracy: f64,
}

#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub model: LogisticModel,
    pub best_c: f64,
    pub best_score: f64,
    pub candidates: Vec<CandidateScore>,
}

// Cross-validated grid search over params.c_grid, scored by accuracy.
// Inputs: scaled training records and labels, search parameters, rng for fold assignment
// Outputs: the model refit on all training records with the winning C
// Key steps:
// 1. Reject single-class training data
// 2. Assign stratified folds once, shared by every candidate
// 3. Mean fold accuracy per candidate; first maximum wins
// 4. Refit the winner on the full training split
pub fn select_model(
    records: ArrayView2<'_, f64>,
    labels: ArrayView1<'_, usize>,
    params: &ModelParams,
    rng: &mut StdRng,
) -> Result<ModelSelection> {
    let fraud = labels.iter().filter(|&&l| l == FRAUDULENT).count();
    if fraud == 0 || fraud == labels.len() {
        return Err(FraudError::DegenerateSplit(format!(
            "training split of {} records holds a single class",
            labels.len()
        )));
    }
    if params.c_grid.is_empty() {
        return Err(FraudError::Config("empty regularisation grid".to_string()));
    }

    let folds = stratified_folds(labels, params.cv_folds, rng)?;
    let mut candidates = Vec::with_capacity(params.c_grid.len());
    for &c in &params.c_grid {
        if !(c > 0.0) {
            return Err(FraudError::Config(format!("regularisation strength {} is not positive", c)));
        }
        let mut fold_accuracies = Vec::with_capacity(folds.len());
        for (fold, (train, validation)) in folds.iter().enumerate() {
            let model = LogisticModel::fit(
                records.select(Axis(0), train).view(),
                labels.select(Axis(0), train).view(),
                c,
                params,
            )?;
            let predicted = model.predict(records.select(Axis(0), validation).view(), DEFAULT_THRESHOLD)?;
            let score = accuracy(labels.select(Axis(0), validation).view(), predicted.view());
            debug!(c, fold, accuracy = score, "scored grid candidate");
            fold_accuracies.push(score);
        }
        let mean_accuracy = fold_accuracies.iter().sum::<f64>() / fold_accuracies.len() as f64;
        candidates.push(CandidateScore {
            c,
            fold_accuracies,
            mean_accuracy,
        });
    }

    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        if candidate.mean_accuracy > best.mean_accuracy {
            best = candidate;
        }
    }
    let (best_c, best_score) = (best.c, best.mean_accuracy);
    info!(best_c, cv_accuracy = best_score, "selected regularisation strength");

    let model = LogisticModel::fit(records, labels, best_c, params)?;
    Ok(ModelSelection {
        model,
        best_c,
        best_score,
        candidates,
    })
}
