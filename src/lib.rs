//! Credit-card fraud classification: load and normalise labelled transactions,
//! rebalance the classes, standardise features, pick a regularised logistic
//! regression by cross-validated grid search, calibrate it, and persist the
//! model/scaler/feature-list bundle used to score new uploads.

pub mod artifacts;
pub mod balance;
pub mod calibrate;
pub mod config;
pub mod csv_reader;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod frame;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod scaler;
pub mod schema;
pub mod split;


pub use config::PipelineConfig;
pub use dataset::TransactionSet;
pub use error::{FraudError, Result};
pub use inference::{score_upload, Diagnostic, FraudModel, InferenceBundle};
pub use schema::{FeatureSchema, FillStrategy};
