use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::dataset::{FRAUDULENT, LEGITIMATE};
use crate::error::{FraudError, Result};

fn shuffled_class_indices(labels: ArrayView1<'_, usize>, class: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut indices: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == class)
        .map(|(i, _)| i)
        .collect();
    indices.shuffle(rng);
    indices
}

/// Splits row indices into (train, test), keeping each class's share of the test split
/// at `round(n_class * test_fraction)`.
pub fn stratified_split(
    labels: ArrayView1<'_, usize>,
    test_fraction: f64,
    rng: &mut StdRng,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(FraudError::Config(format!(
            "test fraction {} is outside (0, 1)",
            test_fraction
        )));
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in [LEGITIMATE, FRAUDULENT] {
        let indices = shuffled_class_indices(labels, class, rng);
        let n_test = (indices.len() as f64 * test_fraction).round() as usize;
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

/// Stratified k-fold: returns `k` (train, validation) index pairs whose validation
/// parts partition the rows.
pub fn stratified_folds(
    labels: ArrayView1<'_, usize>,
    k: usize,
    rng: &mut StdRng,
) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if k < 2 {
        return Err(FraudError::Config(format!("need at least 2 folds, got {}", k)));
    }
    if labels.len() < k {
        return Err(FraudError::DegenerateSplit(format!(
            "{} records cannot be split into {} folds",
            labels.len(),
            k
        )));
    }

    // The round-robin position carries over from one class to the next, so every
    // validation part is non-empty even when the minority class has fewer than k rows.
    let mut assignment = vec![0usize; labels.len()];
    let mut position = 0;
    for class in [LEGITIMATE, FRAUDULENT] {
        for index in shuffled_class_indices(labels, class, rng) {
            assignment[index] = position % k;
            position += 1;
        }
    }

    let folds = (0..k)
        .map(|fold| {
            let (validation, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| assignment[i] == fold);
            (train, validation)
        })
        .collect();
    Ok(folds)
}
