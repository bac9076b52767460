use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FraudError, Result};
use crate::frame::Frame;

pub const LABEL_COLUMN: &str = "Class";
pub const N_COMPONENTS: usize = 28;

/// Names of the model inputs, in the order the scaler and model were fit against,
/// plus the label column and any identifier columns to ignore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSchema {
    pub features: Vec<String>,
    pub label: String,
    pub identifier_columns: Vec<String>,
}

impl FeatureSchema {
    // Time, V1..V28, Amount
    pub fn credit_card() -> Self {
        let mut features = Vec::with_capacity(N_COMPONENTS + 2);
        features.push("Time".to_string());
        features.extend((1..=N_COMPONENTS).map(|i| format!("V{}", i)));
        features.push("Amount".to_string());
        FeatureSchema {
            features,
            label: LABEL_COLUMN.to_string(),
            identifier_columns: vec!["id".to_string(), "Unnamed: 0".to_string()],
        }
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::credit_card()
    }
}

/// What to do when an expected feature column is absent from the input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    #[default]
    Zero,
    Constant(f64),
    Reject,
}

impl fmt::Display for FillStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillStrategy::Zero => write!(f, "zero"),
            FillStrategy::Constant(v) => write!(f, "constant({})", v),
            FillStrategy::Reject => write!(f, "reject"),
        }
    }
}

/// Result of reindexing: the matrix in feature-list order and the columns that had to be filled.
#[derive(Debug, Clone, PartialEq)]
pub struct Reindexed {
    pub matrix: Array2<f64>,
    pub defaulted: Vec<String>,
}

// Select `features` from `frame` in that exact order. Extra columns are dropped,
// absent ones are filled according to `fill`.
pub fn reindex(frame: &Frame, features: &[String], fill: FillStrategy) -> Result<Reindexed> {
    let mut matrix = Array2::zeros((frame.n_rows(), features.len()));
    let mut defaulted = Vec::new();

    for (j, name) in features.iter().enumerate() {
        if let Some(column) = frame.column(name) {
            matrix.column_mut(j).assign(&column);
            continue;
        }
        if frame.is_text(name) {
            return Err(FraudError::MalformedInput(format!(
                "column {} holds non-numeric values",
                name
            )));
        }
        match fill {
            FillStrategy::Zero => {}
            FillStrategy::Constant(value) => matrix.column_mut(j).fill(value),
            FillStrategy::Reject => {
                return Err(FraudError::MalformedInput(format!(
                    "missing required column {}",
                    name
                )))
            }
        }
        defaulted.push(name.clone());
    }

    if !defaulted.is_empty() {
        warn!(columns = ?defaulted, fill = %fill, "filled absent feature columns");
    }

    Ok(Reindexed { matrix, defaulted })
}
