//! Scoring new transactions with a persisted model, scaler and feature list.

use std::fmt;

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calibrate::CalibratedModel;
use crate::dataset::FRAUDULENT;
use crate::error::{FraudError, Result};
use crate::evaluate::{evaluate, EvaluationReport};
use crate::frame::Frame;
use crate::model::LogisticModel;
use crate::scaler::StandardScaler;
use crate::schema::{reindex, FillStrategy, Reindexed};

/// The persisted classifier: either the raw selected model or its calibrated wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FraudModel {
    Logistic(LogisticModel),
    Calibrated(CalibratedModel),
}

impl FraudModel {
    pub fn n_features(&self) -> usize {
        match self {
            FraudModel::Logistic(m) => m.n_features(),
            FraudModel::Calibrated(m) => m.n_features(),
        }
    }

    pub fn predict_proba(&self, records: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        match self {
            FraudModel::Logistic(m) => m.predict_proba(records),
            FraudModel::Calibrated(m) => m.predict_proba(records),
        }
    }

    pub fn predict(&self, records: ArrayView2<'_, f64>, threshold: f64) -> Result<Array1<usize>> {
        match self {
            FraudModel::Logistic(m) => m.predict(records, threshold),
            FraudModel::Calibrated(m) => m.predict(records, threshold),
        }
    }
}

/// Everything needed to score new data. Built once and passed by reference;
/// nothing in it changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceBundle {
    model: FraudModel,
    scaler: StandardScaler,
    features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: usize,
    pub probability: f64,
}

impl Prediction {
    pub fn is_fraud(&self) -> bool {
        self.label == FRAUDULENT
    }

    // Probability of the predicted class.
    pub fn confidence(&self) -> f64 {
        if self.is_fraud() {
            self.probability
        } else {
            1.0 - self.probability
        }
    }

    pub fn describe(&self) -> &'static str {
        if self.is_fraud() {
            "Potentially Fraudulent"
        } else {
            "Not Fraudulent"
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scored {
    pub predictions: Vec<Prediction>,
    /// Feature columns absent from the input and filled by the fill strategy.
    pub defaulted: Vec<String>,
    /// Present when the input carried ground-truth labels.
    pub evaluation: Option<EvaluationReport>,
}

impl Scored {
    // [not fraudulent, potentially fraudulent]
    pub fn distribution(&self) -> [usize; 2] {
        let fraud = self.predictions.iter().filter(|p| p.is_fraud()).count();
        [self.predictions.len() - fraud, fraud]
    }
}

impl InferenceBundle {
    pub fn new(model: FraudModel, scaler: StandardScaler, features: Vec<String>) -> Result<Self> {
        for width in [model.n_features(), scaler.n_features()] {
            if width != features.len() {
                return Err(FraudError::ShapeMismatch {
                    expected: features.len(),
                    actual: width,
                });
            }
        }
        Ok(InferenceBundle {
            model,
            scaler,
            features,
        })
    }

    pub fn model(&self) -> &FraudModel {
        &self.model
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    // Reindex to the feature list, apply the stored scaler, then the model.
    // `label` names the ground-truth column to evaluate against, if the frame has it.
    pub fn score(&self, frame: &Frame, label: &str, fill: FillStrategy, threshold: f64) -> Result<Scored> {
        let Reindexed { matrix, defaulted } = reindex(frame, &self.features, fill)?;
        if let Some(((row, column), _)) = matrix.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(FraudError::MalformedInput(format!(
                "row {} has no numeric value for {}",
                row + 1,
                self.features[column]
            )));
        }
        let scaled = self.scaler.transform(matrix.view())?;
        let probabilities = self.model.predict_proba(scaled.view())?;
        let labels = self.model.predict(scaled.view(), threshold)?;

        let predictions: Vec<Prediction> = labels
            .iter()
            .zip(probabilities.iter())
            .map(|(&label, &probability)| Prediction { label, probability })
            .collect();

        let evaluation = match frame.column(label) {
            Some(truth) if truth.iter().all(|v| *v == 0.0 || *v == 1.0) => {
                let truth = truth.mapv(|v| v as usize);
                Some(evaluate(truth.view(), labels.view(), Some(probabilities.view()))?)
            }
            Some(_) => {
                warn!(column = label, "label column present but not binary, skipping evaluation");
                None
            }
            None => None,
        };

        info!(rows = predictions.len(), defaulted = defaulted.len(), "scored transactions");
        Ok(Scored {
            predictions,
            defaulted,
            evaluation,
        })
    }
}

/// Human-readable explanation of why an upload could not be scored.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub expected_columns: Vec<String>,
    pub actual_columns: Option<Vec<String>>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error Processing File")?;
        writeln!(f, "Error details: {}", self.message)?;
        writeln!(f, "Please check the file format and ensure it matches the expected structure.")?;
        writeln!(f, "Expected columns: {}", self.expected_columns.join(", "))?;
        match &self.actual_columns {
            Some(actual) => write!(f, "Actual columns: {}", actual.join(", ")),
            None => write!(f, "Actual columns: Unable to read columns"),
        }
    }
}

// Boundary for untrusted uploads: any failure becomes a Diagnostic instead of an error.
pub fn score_upload(
    bundle: &InferenceBundle,
    bytes: &[u8],
    label: &str,
    fill: FillStrategy,
    threshold: f64,
) -> std::result::Result<Scored, Diagnostic> {
    let diagnostic = |message: String, actual_columns: Option<Vec<String>>| Diagnostic {
        message,
        expected_columns: bundle.features().to_vec(),
        actual_columns,
    };

    let text = std::str::from_utf8(bytes)
        .map_err(|e| diagnostic(format!("file is not UTF-8 text: {}", e), None))?;
    let frame = Frame::from_reader(text.as_bytes()).map_err(|e| diagnostic(e.to_string(), None))?;

    let actual = frame.all_columns();
    if frame.n_rows() == 0 {
        return Err(diagnostic("file contains no data rows".to_string(), Some(actual)));
    }
    if !bundle.features().iter().any(|f| frame.contains(f)) {
        return Err(diagnostic(
            "none of the expected feature columns are present".to_string(),
            Some(actual),
        ));
    }

    bundle
        .score(&frame, label, fill, threshold)
        .map_err(|e| diagnostic(e.to_string(), Some(actual)))
}
