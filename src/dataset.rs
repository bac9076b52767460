use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{FraudError, Result};

pub const LEGITIMATE: usize = 0;
pub const FRAUDULENT: usize = 1;

/// Labelled transactions: one row per record, columns in `features` order.
///
/// Each pipeline stage derives a new set; nothing mutates one in place.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSet {
    features: Vec<String>,
    records: Array2<f64>,
    labels: Array1<usize>,
}

pub fn check_labels(labels: ArrayView1<'_, usize>) -> Result<()> {
    match labels.iter().find(|&&l| l != LEGITIMATE && l != FRAUDULENT) {
        Some(bad) => Err(FraudError::InvalidLabel(format!(
            "label {} is neither 0 nor 1",
            bad
        ))),
        None => Ok(()),
    }
}

impl TransactionSet {
    pub fn new(features: Vec<String>, records: Array2<f64>, labels: Array1<usize>) -> Result<Self> {
        if records.ncols() != features.len() {
            return Err(FraudError::ShapeMismatch {
                expected: features.len(),
                actual: records.ncols(),
            });
        }
        if records.nrows() != labels.len() {
            return Err(FraudError::InvalidLabel(format!(
                "{} records but {} labels",
                records.nrows(),
                labels.len()
            )));
        }
        check_labels(labels.view())?;
        Ok(TransactionSet {
            features,
            records,
            labels,
        })
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn records(&self) -> ArrayView2<'_, f64> {
        self.records.view()
    }

    pub fn labels(&self) -> ArrayView1<'_, usize> {
        self.labels.view()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    // [legitimate, fraudulent]
    pub fn class_counts(&self) -> [usize; 2] {
        let fraud = self.labels.iter().filter(|&&l| l == FRAUDULENT).count();
        [self.len() - fraud, fraud]
    }

    pub fn indices_of(&self, class: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn select(&self, rows: &[usize]) -> TransactionSet {
        TransactionSet {
            features: self.features.clone(),
            records: self.records.select(Axis(0), rows),
            labels: self.labels.select(Axis(0), rows),
        }
    }

    /// Returns a new set with `records`/`labels` appended after the existing rows.
    pub fn extended<'a>(&'a self, records: ArrayView2<'a, f64>, labels: ArrayView1<'a, usize>) -> Result<Self> {
        let all_records = concatenate(Axis(0), &[self.records.view(), records])
            .map_err(|_| FraudError::ShapeMismatch {
                expected: self.features.len(),
                actual: records.ncols(),
            })?;
        let all_labels = concatenate(Axis(0), &[self.labels.view(), labels])
            .map_err(|e| FraudError::InvalidLabel(e.to_string()))?;
        TransactionSet::new(self.features.clone(), all_records, all_labels)
    }

    pub fn require_both_classes(&self, context: &str) -> Result<()> {
        let [legit, fraud] = self.class_counts();
        if legit == 0 || fraud == 0 {
            return Err(FraudError::DegenerateSplit(format!(
                "{} has {} legitimate and {} fraudulent records",
                context, legit, fraud
            )));
        }
        Ok(())
    }
}
