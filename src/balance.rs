//! Class rebalancing for the skewed legitimate/fraudulent split.

use std::fmt;
use std::str::FromStr;

use linfa_nn::distance::L2Dist;
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::TransactionSet;
use crate::error::{FraudError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    None,
    /// Randomly drop majority records down to the minority count.
    #[default]
    Undersample,
    /// Synthesise minority records by interpolating towards nearest minority neighbours.
    Smote,
}

impl FromStr for BalanceStrategy {
    type Err = FraudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(BalanceStrategy::None),
            "undersample" => Ok(BalanceStrategy::Undersample),
            "smote" => Ok(BalanceStrategy::Smote),
            other => Err(FraudError::Config(format!(
                "unknown balance strategy {} (expected none, undersample or smote)",
                other
            ))),
        }
    }
}

impl fmt::Display for BalanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BalanceStrategy::None => "none",
            BalanceStrategy::Undersample => "undersample",
            BalanceStrategy::Smote => "smote",
        };
        f.write_str(name)
    }
}

/// Where balancing happens relative to the train/test split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceScope {
    /// Only the training split is rebalanced; the test split keeps the true distribution.
    #[default]
    TrainOnly,
    /// The whole dataset is rebalanced before splitting.
    FullDataset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub strategy: BalanceStrategy,
    pub scope: BalanceScope,
    /// minority / majority after balancing
    pub minority_ratio: f64,
    pub k_neighbors: usize,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        BalanceConfig {
            strategy: BalanceStrategy::Undersample,
            scope: BalanceScope::TrainOnly,
            minority_ratio: 1.0,
            k_neighbors: 5,
        }
    }
}

// (minority class, majority class) by count; ties go to fraud as minority.
fn minority_majority(set: &TransactionSet) -> (usize, usize) {
    let [legit, fraud] = set.class_counts();
    if fraud <= legit {
        (1, 0)
    } else {
        (0, 1)
    }
}

pub fn rebalance(set: &TransactionSet, config: &BalanceConfig, rng: &mut StdRng) -> Result<TransactionSet> {
    let balanced = match config.strategy {
        BalanceStrategy::None => return Ok(set.clone()),
        BalanceStrategy::Undersample => undersample(set, config.minority_ratio, rng)?,
        BalanceStrategy::Smote => smote(set, config.minority_ratio, config.k_neighbors, rng)?,
    };
    let [legit, fraud] = balanced.class_counts();
    info!(
        strategy = %config.strategy,
        before = set.len(),
        after = balanced.len(),
        legitimate = legit,
        fraudulent = fraud,
        "rebalanced classes"
    );
    Ok(balanced)
}

// Keep every minority record plus a random majority sample of size minority / ratio.
// Output order: sampled majority first, then the minority records.
pub fn undersample(set: &TransactionSet, minority_ratio: f64, rng: &mut StdRng) -> Result<TransactionSet> {
    let (minority, majority) = minority_majority(set);
    let minority_rows = set.indices_of(minority);
    let majority_rows = set.indices_of(majority);
    if minority_rows.is_empty() {
        return Err(FraudError::DegenerateSplit(
            "cannot undersample without any minority records".to_string(),
        ));
    }

    let target = ((minority_rows.len() as f64 / minority_ratio).round() as usize).min(majority_rows.len());
    let mut sampled: Vec<usize> = majority_rows.choose_multiple(rng, target).cloned().collect();
    sampled.sort_unstable();
    sampled.extend_from_slice(&minority_rows);
    Ok(set.select(&sampled))
}

// SMOTE: each synthetic record is x + gap * (neighbour - x) for a random minority
// record x, one of its k nearest minority neighbours, and gap ~ U[0, 1).
// The originals are kept untouched and the synthetic rows appended after them.
pub fn smote(
    set: &TransactionSet,
    minority_ratio: f64,
    k_neighbors: usize,
    rng: &mut StdRng,
) -> Result<TransactionSet> {
    let (minority, majority) = minority_majority(set);
    let minority_rows = set.indices_of(minority);
    let n_majority = set.indices_of(majority).len();
    if minority_rows.is_empty() {
        return Err(FraudError::DegenerateSplit(
            "cannot oversample without any minority records".to_string(),
        ));
    }

    let target = (n_majority as f64 * minority_ratio).round() as usize;
    let n_synthetic = target.saturating_sub(minority_rows.len());
    if n_synthetic == 0 {
        return Ok(set.clone());
    }
    if minority_rows.len() < 2 {
        return Err(FraudError::DegenerateSplit(
            "oversampling needs at least 2 minority records".to_string(),
        ));
    }
    let k = k_neighbors.min(minority_rows.len() - 1).max(1);

    let points = set.records().select(Axis(0), &minority_rows);
    let index = CommonNearestNeighbour::KdTree
        .from_batch(&points, L2Dist)
        .map_err(|e| FraudError::Neighbours(e.to_string()))?;

    // Neighbour lists are computed once per minority record, excluding the record itself.
    let mut neighbours: Vec<Vec<usize>> = Vec::with_capacity(points.nrows());
    for (i, point) in points.rows().into_iter().enumerate() {
        let found = index
            .k_nearest(point, k + 1)
            .map_err(|e| FraudError::Neighbours(e.to_string()))?;
        let mut list: Vec<usize> = found.into_iter().map(|(_, j)| j).filter(|&j| j != i).collect();
        list.truncate(k);
        neighbours.push(list);
    }

    let mut synthetic = Array2::zeros((n_synthetic, points.ncols()));
    for mut row in synthetic.rows_mut() {
        let base = rng.gen_range(0..points.nrows());
        let neighbour = match neighbours[base].choose(rng) {
            Some(&j) => j,
            None => base,
        };
        let gap: f64 = rng.gen();
        let origin = points.row(base);
        let towards = points.row(neighbour);
        row.assign(&(&origin + &((&towards - &origin) * gap)));
    }

    let labels = Array1::from_elem(n_synthetic, minority);
    set.extended(synthetic.view(), labels.view())
}
