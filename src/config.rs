//! Pipeline configuration: TOML file, then `FRAUD__*` environment variables.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::balance::BalanceConfig;
use crate::calibrate::CalibrationConfig;
use crate::error::{FraudError, Result};
use crate::model::ModelParams;
use crate::schema::{FeatureSchema, FillStrategy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Labelled CSV sources, concatenated in order.
    pub inputs: Vec<PathBuf>,
    /// Where model.json, scaler.json and feature_names.json are written.
    pub output_dir: PathBuf,
    pub seed: u64,
    pub test_fraction: f64,
    /// Policy for expected feature columns absent from a source.
    pub missing_columns: FillStrategy,
    pub schema: FeatureSchema,
    pub balance: BalanceConfig,
    pub model: ModelParams,
    pub calibration: CalibrationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            inputs: Vec::new(),
            output_dir: PathBuf::from("artifacts"),
            seed: 42,
            test_fraction: 0.2,
            missing_columns: FillStrategy::Zero,
            schema: FeatureSchema::credit_card(),
            balance: BalanceConfig::default(),
            model: ModelParams::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, overlaid by the file at `path` if given, then by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("FRAUD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    // Checks everything a training run needs except the input list,
    // which the loader rejects when empty.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(FraudError::Config(msg)) };

        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return invalid(format!("test_fraction {} is outside (0, 1)", self.test_fraction));
        }
        if self.schema.features.is_empty() {
            return invalid("feature list is empty".to_string());
        }
        if self.schema.features.contains(&self.schema.label) {
            return invalid(format!("label column {} is listed as a feature", self.schema.label));
        }
        if !(self.balance.minority_ratio > 0.0 && self.balance.minority_ratio <= 1.0) {
            return invalid(format!(
                "minority_ratio {} is outside (0, 1]",
                self.balance.minority_ratio
            ));
        }
        if self.balance.k_neighbors == 0 {
            return invalid("k_neighbors must be at least 1".to_string());
        }
        if self.model.c_grid.is_empty() {
            return invalid("c_grid is empty".to_string());
        }
        if let Some(c) = self.model.c_grid.iter().find(|c| !(**c > 0.0 && c.is_finite())) {
            return invalid(format!("regularisation strength {} is not positive", c));
        }
        if self.model.cv_folds < 2 {
            return invalid(format!("cv_folds must be at least 2, got {}", self.model.cv_folds));
        }
        if self.calibration.folds < 2 {
            return invalid(format!(
                "calibration folds must be at least 2, got {}",
                self.calibration.folds
            ));
        }
        if !(0.0..=1.0).contains(&self.calibration.threshold) {
            return invalid(format!(
                "threshold {} is outside [0, 1]",
                self.calibration.threshold
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::{BalanceScope, BalanceStrategy};
    use std::io::Write;

    fn with_input() -> PipelineConfig {
        PipelineConfig {
            inputs: vec![PathBuf::from("creditcard.csv")],
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.schema.features.len(), 30);
        assert_eq!(config.schema.features[0], "Time");
        assert_eq!(config.schema.features[29], "Amount");
        assert_eq!(config.balance.strategy, BalanceStrategy::Undersample);
        assert_eq!(config.balance.scope, BalanceScope::TrainOnly);
        assert_eq!(config.model.c_grid, vec![0.01, 0.1, 1.0, 10.0, 100.0]);
        assert_eq!(config.calibration.threshold, 0.5);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(with_input().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = with_input();
        config.model.c_grid = vec![1.0, 0.0];
        assert!(config.validate().is_err());

        let mut config = with_input();
        config.test_fraction = 1.0;
        assert!(config.validate().is_err());

        let mut config = with_input();
        config.model.cv_folds = 1;
        assert!(config.validate().is_err());

        let mut config = with_input();
        config.schema.features.push("Class".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
inputs = ["a.csv", "b.csv"]
seed = 7

[balance]
strategy = "smote"
k_neighbors = 3

[model]
c_grid = [0.5, 2.0]
"#
        )
        .unwrap();

        let config = PipelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.seed, 7);
        assert_eq!(config.balance.strategy, BalanceStrategy::Smote);
        assert_eq!(config.balance.k_neighbors, 3);
        assert_eq!(config.balance.minority_ratio, 1.0);
        assert_eq!(config.model.c_grid, vec![0.5, 2.0]);
        assert_eq!(config.model.cv_folds, 5);
        assert_eq!(config.schema.label, "Class");
    }
}
