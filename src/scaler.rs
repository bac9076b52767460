use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FraudError, Result};

/// Per-feature standardisation learned from one training split.
///
/// There is no way to refit an existing scaler: `fit` builds a new value and every
/// other method only applies the stored statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
    #[serde(default)]
    zero_variance: Vec<usize>,
}

impl StandardScaler {
    // Population standard deviation; a zero-variance feature keeps scale 1.
    pub fn fit(records: ArrayView2<'_, f64>) -> Result<Self> {
        if records.nrows() == 0 {
            return Err(FraudError::DegenerateSplit(
                "cannot fit a scaler on zero records".to_string(),
            ));
        }
        let mean = records
            .mean_axis(Axis(0))
            .ok_or_else(|| FraudError::DegenerateSplit("empty training split".to_string()))?;
        let std = records.std_axis(Axis(0), 0.0);

        let mut zero_variance = Vec::new();
        let scale: Vec<f64> = std
            .iter()
            .enumerate()
            .map(|(j, &s)| {
                if s > 0.0 && s.is_finite() {
                    s
                } else {
                    zero_variance.push(j);
                    1.0
                }
            })
            .collect();
        if !zero_variance.is_empty() {
            warn!(features = ?zero_variance, "zero-variance features left unscaled");
        }

        Ok(StandardScaler {
            mean: mean.to_vec(),
            scale,
            zero_variance,
        })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn zero_variance_features(&self) -> &[usize] {
        &self.zero_variance
    }

    fn check_width(&self, records: &ArrayView2<'_, f64>) -> Result<()> {
        if records.ncols() != self.n_features() {
            return Err(FraudError::ShapeMismatch {
                expected: self.n_features(),
                actual: records.ncols(),
            });
        }
        Ok(())
    }

    pub fn transform(&self, records: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(&records)?;
        let mean = Array1::from(self.mean.clone());
        let scale = Array1::from(self.scale.clone());
        Ok((&records - &mean) / &scale)
    }

    pub fn inverse_transform(&self, scaled: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(&scaled)?;
        let mean = Array1::from(self.mean.clone());
        let scale = Array1::from(self.scale.clone());
        Ok(&scaled * &scale + &mean)
    }
}
