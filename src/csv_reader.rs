use std::path::Path;

use ndarray::{Array1, Array2};
use tracing::{debug, info, warn};

use crate::dataset::{TransactionSet, FRAUDULENT, LEGITIMATE};
use crate::error::{FraudError, Result};
use crate::frame::Frame;
use crate::schema::{reindex, FeatureSchema, FillStrategy, Reindexed};

// Replace NaN cells with the column mean of the remaining cells.
// Returns (column index, cells filled) for every column that needed it.
pub fn impute_column_means(matrix: &mut Array2<f64>) -> Vec<(usize, usize)> {
    let mut filled = Vec::new();
    for (j, mut column) in matrix.columns_mut().into_iter().enumerate() {
        let (sum, present) = column
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        let missing = column.len() - present;
        if missing == 0 {
            continue;
        }
        let mean = if present > 0 { sum / present as f64 } else { 0.0 };
        column.mapv_inplace(|v| if v.is_nan() { mean } else { v });
        filled.push((j, missing));
    }
    filled
}

// Loads one or more labelled CSV sources into a single normalised set.
// Inputs: source paths, the feature schema, the policy for absent feature columns
// Outputs: TransactionSet restricted to schema.features (in order) plus labels
// Key steps:
// 1. Read every source, each must carry the label column
// 2. Concatenate row-wise on the union of columns
// 3. Drop rows without a label, reject labels other than 0/1
// 4. Reindex to the feature list and mean-impute the gaps
pub fn read_transactions<P: AsRef<Path>>(
    paths: &[P],
    schema: &FeatureSchema,
    fill: FillStrategy,
) -> Result<TransactionSet> {
    if paths.is_empty() {
        return Err(FraudError::Config("no input sources given".to_string()));
    }

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let frame = Frame::from_path(path)?;
        if !frame.contains(&schema.label) && !frame.is_text(&schema.label) {
            return Err(FraudError::Schema(format!(
                "{} has no {} column",
                path.display(),
                schema.label
            )));
        }
        info!(
            path = %path.display(),
            rows = frame.n_rows(),
            columns = frame.columns().len(),
            "read transaction source"
        );
        frames.push(frame);
    }
    let merged = Frame::concat(&frames);

    let identifiers: Vec<String> = merged
        .all_columns()
        .into_iter()
        .filter(|c| schema.identifier_columns.contains(c))
        .collect();
    if !identifiers.is_empty() {
        debug!(columns = ?identifiers, "dropping identifier columns");
    }

    let label_column = merged.column(&schema.label).ok_or_else(|| {
        FraudError::Schema(format!("{} column is not numeric", schema.label))
    })?;

    let mut keep = Vec::with_capacity(merged.n_rows());
    let mut labels = Vec::with_capacity(merged.n_rows());
    for (i, &value) in label_column.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        let label = if value == 0.0 {
            LEGITIMATE
        } else if value == 1.0 {
            FRAUDULENT
        } else {
            return Err(FraudError::Schema(format!(
                "row {} has label {}, expected 0 or 1",
                i + 1,
                value
            )));
        };
        keep.push(i);
        labels.push(label);
    }
    let dropped = merged.n_rows() - keep.len();
    if dropped > 0 {
        warn!(rows = dropped, "dropped rows without a label");
    }
    let merged = merged.select_rows(&keep);

    let Reindexed { mut matrix, .. } = reindex(&merged, &schema.features, fill)?;
    for (j, count) in impute_column_means(&mut matrix) {
        debug!(column = %schema.features[j], cells = count, "imputed missing values with column mean");
    }

    let set = TransactionSet::new(schema.features.clone(), matrix, Array1::from(labels))?;
    let [legit, fraud] = set.class_counts();
    info!(records = set.len(), legitimate = legit, fraudulent = fraud, "loaded transactions");
    Ok(set)
}

pub fn write_dataset(path: &Path, set: &TransactionSet, label: &str) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header: Vec<&str> = set.features().iter().map(String::as_str).collect();
    header.push(label);
    wtr.write_record(&header)?;

    for (row, label) in set.records().rows().into_iter().zip(set.labels().iter()) {
        let mut fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        fields.push(label.to_string());
        wtr.write_record(&fields)?;
    }
    wtr.flush().map_err(|e| FraudError::io(path, e))?;
    Ok(())
}
