use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::{FraudError, Result};
use crate::inference::{FraudModel, InferenceBundle};
use crate::scaler::StandardScaler;

pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const FEATURES_FILE: &str = "feature_names.json";

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub scaler: PathBuf,
    pub features: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        ArtifactPaths {
            model: dir.join(MODEL_FILE),
            scaler: dir.join(SCALER_FILE),
            features: dir.join(FEATURES_FILE),
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Persists the model, scaler and feature list as three separate JSON files.
/// All three are serialised and staged as sibling temp files before any target is
/// replaced, so a failed write leaves the previous set untouched.
pub fn write_bundle(dir: &Path, bundle: &InferenceBundle) -> Result<ArtifactPaths> {
    let model = serde_json::to_string_pretty(bundle.model())?;
    let scaler = serde_json::to_string_pretty(bundle.scaler())?;
    let features = serde_json::to_string_pretty(bundle.features())?;

    fs::create_dir_all(dir).map_err(|e| FraudError::io(dir, e))?;
    let paths = ArtifactPaths::in_dir(dir);
    let targets = [
        (&paths.model, model),
        (&paths.scaler, scaler),
        (&paths.features, features),
    ];

    let mut staged: Vec<(PathBuf, &PathBuf)> = Vec::with_capacity(targets.len());
    for (path, contents) in &targets {
        let tmp = staging_path(path);
        if let Err(e) = fs::write(&tmp, contents) {
            for (written, _) in &staged {
                let _ = fs::remove_file(written);
            }
            return Err(FraudError::io(&tmp, e));
        }
        staged.push((tmp, *path));
    }
    for (tmp, path) in &staged {
        fs::rename(tmp, path).map_err(|e| FraudError::io(path, e))?;
    }

    info!(dir = %dir.display(), features = bundle.features().len(), "wrote model artifacts");
    Ok(paths)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| FraudError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

/// Loads the three artifacts. Only their widths are checked against each other;
/// nothing ties them to the same training run.
pub fn load_bundle(dir: &Path) -> Result<InferenceBundle> {
    let paths = ArtifactPaths::in_dir(dir);
    let model: FraudModel = read_json(&paths.model)?;
    let scaler: StandardScaler = read_json(&paths.scaler)?;
    let features: Vec<String> = read_json(&paths.features)?;
    InferenceBundle::new(model, scaler, features)
}
