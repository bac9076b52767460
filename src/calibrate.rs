//! Sigmoid (Platt) recalibration of the selected classifier's probabilities.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::{FRAUDULENT, LEGITIMATE};
use crate::error::{FraudError, Result};
use crate::model::{LogisticModel, ModelParams};
use crate::split::stratified_folds;

const MAX_NEWTON_ITERATIONS: usize = 100;
const MIN_STEP: f64 = 1e-10;
const HESSIAN_RIDGE: f64 = 1e-12;
const GRADIENT_EPSILON: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub enabled: bool,
    pub folds: usize,
    pub threshold: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            enabled: true,
            folds: 5,
            threshold: 0.5,
        }
    }
}

/// `p = 1 / (1 + exp(a * score + b))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaling {
    pub a: f64,
    pub b: f64,
}

// Negative log-likelihood of one (score, target) pair, written to stay finite
// for large |a * score + b|.
fn pair_loss(f_apb: f64, target: f64) -> f64 {
    if f_apb >= 0.0 {
        target * f_apb + (1.0 + (-f_apb).exp()).ln()
    } else {
        (target - 1.0) * f_apb + (1.0 + f_apb.exp()).ln()
    }
}

impl PlattScaling {
    /// Newton's method with backtracking on Platt's smoothed targets.
    pub fn fit(scores: ArrayView1<'_, f64>, labels: ArrayView1<'_, usize>) -> Result<Self> {
        if scores.len() != labels.len() {
            return Err(FraudError::InvalidLabel(format!(
                "{} scores but {} labels",
                scores.len(),
                labels.len()
            )));
        }
        if labels.is_empty() {
            return Err(FraudError::DegenerateSplit("calibration fold is empty".to_string()));
        }
        // A fold with a single class still has well-defined smoothed targets.
        let prior1 = labels.iter().filter(|&&l| l == FRAUDULENT).count() as f64;
        let prior0 = labels.len() as f64 - prior1;
        if prior1 == 0.0 || prior0 == 0.0 {
            warn!(
                records = labels.len(),
                fraudulent = prior1,
                "calibration fold holds a single class"
            );
        }

        let hi = (prior1 + 1.0) / (prior1 + 2.0);
        let lo = 1.0 / (prior0 + 2.0);
        let targets: Vec<f64> = labels
            .iter()
            .map(|&l| if l == FRAUDULENT { hi } else { lo })
            .collect();

        let loss = |a: f64, b: f64| -> f64 {
            scores
                .iter()
                .zip(targets.iter())
                .map(|(&f, &t)| pair_loss(f * a + b, t))
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
        let mut fval = loss(a, b);

        for iteration in 0..MAX_NEWTON_ITERATIONS {
            let (mut h11, mut h22, mut h21) = (HESSIAN_RIDGE, HESSIAN_RIDGE, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);
            for (&f, &t) in scores.iter().zip(targets.iter()) {
                let f_apb = f * a + b;
                let (p, q) = if f_apb >= 0.0 {
                    let e = (-f_apb).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = f_apb.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }

            if g1.abs() < GRADIENT_EPSILON && g2.abs() < GRADIENT_EPSILON {
                debug!(iteration, a, b, "platt scaling converged");
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= MIN_STEP {
                let (new_a, new_b) = (a + step * da, b + step * db);
                let new_f = loss(new_a, new_b);
                if new_f < fval + 1e-4 * step * gd {
                    a = new_a;
                    b = new_b;
                    fval = new_f;
                    break;
                }
                step /= 2.0;
            }
            if step < MIN_STEP {
                warn!(iteration, "platt line search stalled");
                break;
            }
        }

        Ok(PlattScaling { a, b })
    }

    pub fn probability(&self, score: f64) -> f64 {
        let f_apb = score * self.a + self.b;
        if f_apb >= 0.0 {
            let e = (-f_apb).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + f_apb.exp())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedMember {
    pub base: LogisticModel,
    pub mapping: PlattScaling,
}

/// One base classifier + sigmoid mapping per calibration fold; probabilities are averaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedModel {
    members: Vec<CalibratedMember>,
}

impl CalibratedModel {
    // Inputs: scaled training split, the selected C, model params, fold count
    // Outputs: the fold ensemble
    // Key steps:
    // 1. Stratified folds over the training split
    // 2. Fit a base model on each fold's training part
    // 3. Fit the sigmoid on that model's decision scores for the held-out part
    pub fn fit(
        records: ArrayView2<'_, f64>,
        labels: ArrayView1<'_, usize>,
        c: f64,
        params: &ModelParams,
        folds: usize,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let mut members = Vec::with_capacity(folds);
        for (train, held_out) in stratified_folds(labels, folds, rng)? {
            let base = LogisticModel::fit(
                records.select(Axis(0), &train).view(),
                labels.select(Axis(0), &train).view(),
                c,
                params,
            )?;
            let scores = base.decision_function(records.select(Axis(0), &held_out).view())?;
            let mapping = PlattScaling::fit(scores.view(), labels.select(Axis(0), &held_out).view())?;
            members.push(CalibratedMember { base, mapping });
        }
        info!(members = members.len(), c, "calibrated classifier");
        Ok(CalibratedModel { members })
    }

    pub fn members(&self) -> &[CalibratedMember] {
        &self.members
    }

    pub fn n_features(&self) -> usize {
        self.members.first().map_or(0, |m| m.base.n_features())
    }

    pub fn predict_proba(&self, records: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let mut total = Array1::zeros(records.nrows());
        for member in &self.members {
            let scores = member.base.decision_function(records)?;
            total += &scores.mapv(|s| member.mapping.probability(s));
        }
        Ok(total / self.members.len().max(1) as f64)
    }

    pub fn predict(&self, records: ArrayView2<'_, f64>, threshold: f64) -> Result<Array1<usize>> {
        Ok(self
            .predict_proba(records)?
            .mapv(|p| if p >= threshold { FRAUDULENT } else { LEGITIMATE }))
    }
}
