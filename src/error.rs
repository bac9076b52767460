use std::path::PathBuf;
use thiserror::Error;

/// Every way a pipeline run or a scoring request can fail.
#[derive(Debug, Error)]
pub enum FraudError {
    /// A training source is missing the label column, or carries labels other than 0/1.
    #[error("schema error: {0}")]
    Schema(String),

    /// The data handed to a fitting step contains fewer than two classes.
    #[error("degenerate training split: {0}")]
    DegenerateSplit(String),

    /// Input that cannot be read as the expected table.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("model fitting failed: {0}")]
    Fit(String),

    #[error("nearest-neighbour search failed: {0}")]
    Neighbours(String),

    #[error("shape mismatch: expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("invalid labels: {0}")]
    InvalidLabel(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Settings(#[from] config::ConfigError),
}

impl FraudError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FraudError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, FraudError>;
