use std::fs::File;
use std::io::Read;
use std::path::Path;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{FraudError, Result};

/// A numeric table read from CSV: named columns over an `Array2<f64>`.
///
/// Missing cells are NaN. Columns holding any non-numeric cell (string
/// identifiers and the like) are remembered by name only.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    values: Array2<f64>,
    text_columns: Vec<String>,
}

// Empty cells and the usual NA spellings count as missing, anything else must parse.
fn parse_cell(field: &str) -> Option<f64> {
    match field {
        "" | "NA" | "NaN" | "nan" | "null" => Some(f64::NAN),
        _ => field.parse::<f64>().ok(),
    }
}

impl Frame {
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(FraudError::ShapeMismatch {
                expected: columns.len(),
                actual: values.ncols(),
            });
        }
        Ok(Frame {
            columns,
            values,
            text_columns: Vec::new(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| FraudError::io(path, e))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(FraudError::MalformedInput("no header row".to_string()));
        }

        let mut cells: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
        let mut numeric = vec![true; headers.len()];
        for record in rdr.records() {
            let record = record?;
            for (j, field) in record.iter().enumerate() {
                match parse_cell(field) {
                    Some(value) => cells[j].push(value),
                    None => {
                        numeric[j] = false;
                        cells[j].push(f64::NAN);
                    }
                }
            }
        }

        let mut columns = Vec::new();
        let mut kept = Vec::new();
        let mut text_columns = Vec::new();
        for (j, name) in headers.into_iter().enumerate() {
            if numeric[j] {
                columns.push(name);
                kept.push(j);
            } else {
                text_columns.push(name);
            }
        }

        let n_rows = cells.first().map_or(0, Vec::len);
        let values = Array2::from_shape_fn((n_rows, kept.len()), |(i, j)| cells[kept[j]][i]);

        Ok(Frame {
            columns,
            values,
            text_columns,
        })
    }

    // Row-wise concatenation on the union of columns, in order of first appearance.
    // A frame lacking a column contributes NaN cells for it.
    pub fn concat(frames: &[Frame]) -> Frame {
        let mut columns: Vec<String> = Vec::new();
        let mut text_columns: Vec<String> = Vec::new();
        for frame in frames {
            for name in &frame.columns {
                if !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
            for name in &frame.text_columns {
                if !text_columns.contains(name) {
                    text_columns.push(name.clone());
                }
            }
        }
        // A column that is textual in any source is textual in the merged frame.
        columns.retain(|c| !text_columns.contains(c));

        let n_rows: usize = frames.iter().map(Frame::n_rows).sum();
        let mut values = Array2::from_elem((n_rows, columns.len()), f64::NAN);
        let mut offset = 0;
        for frame in frames {
            for (j, name) in columns.iter().enumerate() {
                if let Some(column) = frame.column(name) {
                    values
                        .slice_mut(ndarray::s![offset..offset + frame.n_rows(), j])
                        .assign(&column);
                }
            }
            offset += frame.n_rows();
        }

        Frame {
            columns,
            values,
            text_columns,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn text_columns(&self) -> &[String] {
        &self.text_columns
    }

    /// Every header name, numeric and textual.
    pub fn all_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .chain(self.text_columns.iter())
            .cloned()
            .collect()
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn is_text(&self, name: &str) -> bool {
        self.text_columns.iter().any(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|j| self.values.column(j))
    }

    pub fn select_rows(&self, rows: &[usize]) -> Frame {
        Frame {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), rows),
            text_columns: self.text_columns.clone(),
        }
    }
}
