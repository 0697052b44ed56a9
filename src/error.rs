//! Error taxonomy for the ingestion and prediction pipeline.
//!
//! Validation and artifact-load failures stop the pipeline outright. Store
//! and inference failures are reported per stage and never roll back a
//! stage that already succeeded.

use std::path::PathBuf;
use thiserror::Error;

/// Incoming payload is missing a required field or carries a value that
/// cannot be coerced to a number.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid value for {field}. Must be a number.")]
    NotNumeric { field: String, value: String },
}

impl ValidationError {
    /// Name of the offending field, if the error is about one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::NotAnObject => None,
            ValidationError::MissingField(field) => Some(field),
            ValidationError::NotNumeric { field, .. } => Some(field),
        }
    }
}

/// Persistence read or write failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },
    #[error("{table} already has a row at timestamp {timestamp}")]
    DuplicateKey { table: &'static str, timestamp: i64 },
}

impl StoreError {
    pub fn operation(operation: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Operation {
            operation,
            message: err.to_string(),
        }
    }
}

/// Model or scaler artifact could not be loaded. Fatal at startup.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("Required file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid artifact {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Failure inside a classifier invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("cannot run inference on an empty window")]
    EmptyWindow,
    #[error("{model}: expected input of shape (1, {expected}, 5), got (1, {actual}, 5)")]
    ShapeMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },
    #[error("{model}: invalid output: {reason}")]
    InvalidOutput { model: String, reason: String },
    #[error("{model}: no result within {timeout_ms} ms")]
    Timeout { model: String, timeout_ms: u64 },
    #[error("{model}: {message}")]
    Runtime { model: String, message: String },
}

/// Prediction-side outcome of a submission whose raw reading was accepted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("prediction store failure: {0}")]
    Store(#[from] StoreError),
    #[error("insufficient history: {available} rows available, {required} required")]
    InsufficientHistory { available: usize, required: usize },
}

/// The submission as a whole failed; nothing was accepted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to persist reading: {0}")]
    Store(#[from] StoreError),
}

/// History query failure. `InvalidDays` is a caller-input error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    #[error("Days parameter must be between 1 and 30, got {0}")]
    InvalidDays(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The keyspace holds no rows yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("No data available")]
    NoReadings,
    #[error("No prediction data available")]
    NoPredictions,
}

/// Latest-row lookup failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration file could not be loaded or holds invalid values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
