use std::path::PathBuf;

use thiserror::Error;

/// Every failure a training run can surface.
///
/// All variants abort the current run; nothing is retried internally.
#[derive(Debug, Error)]
pub enum TrainError {
    /// A hyperparameter or option failed validation before any step ran.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A load was attempted for a model that has never been checkpointed.
    #[error("no checkpoint found for model '{model}'")]
    CheckpointNotFound { model: String },

    /// A loss or gradient stopped being finite.
    #[error("numeric instability at step {step}: {what} is {value}")]
    NumericInstability {
        step: usize,
        what: String,
        value: f64,
    },

    /// A stored parameter set does not fit the model it is loaded into.
    #[error("malformed checkpoint: {0}")]
    Checkpoint(String),

    /// Tensor shapes did not line up.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Dataset arrays failed validation or parsing.
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The exporter rejected the model or produced unusable output.
    #[error("export failed: {0}")]
    Export(String),
}

impl TrainError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrainError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        TrainError::Shape(message.into())
    }
}

pub type Result<T> = std::result::Result<T, TrainError>;
