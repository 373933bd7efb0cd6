use nerfkit_field::{FieldError, MeshIoError};
use nerfkit_rays::RayError;

use crate::model::ModelError;

/// An error type for the training module.
#[derive(thiserror::Error, Debug)]
pub enum TrainError {
    /// Ray generation or pixel gathering failed.
    #[error(transparent)]
    Ray(#[from] RayError),

    /// Field extraction failed.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// Mesh export failed.
    #[error(transparent)]
    MeshIo(#[from] MeshIoError),

    /// The model reported a failure.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Failed to access the workspace.
    #[error("Io error")]
    Io(#[from] std::io::Error),

    /// Failed to encode or decode a checkpoint.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Failed to parse or write a configuration file.
    #[error("Config error")]
    Config(#[from] serde_json::Error),

    /// A configuration value is outside its valid domain.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Input data or model output is inconsistent.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
