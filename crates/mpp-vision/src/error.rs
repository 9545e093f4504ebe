//! Error types for the detection core.

use mpp_models::ErrorKind;
use thiserror::Error;

/// Result type for detection operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors raised by the category mapper, the detection engine and the pipeline.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Category table unavailable: {0}")]
    CategoryTableUnavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Inference timed out after {0} ms")]
    InferenceTimeout(u64),

    /// Invalid startup settings; never produced while serving a request.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl VisionError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::ModelUnavailable(message.into())
    }

    pub fn category_table(message: impl Into<String>) -> Self {
        Self::CategoryTableUnavailable(message.into())
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wire classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VisionError::InvalidInput(_) => ErrorKind::InvalidInput,
            VisionError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            VisionError::CategoryTableUnavailable(_) => ErrorKind::CategoryTableUnavailable,
            VisionError::Inference(_) => ErrorKind::InferenceError,
            VisionError::InferenceTimeout(_) => ErrorKind::InferenceTimeout,
            VisionError::Config(_) => ErrorKind::Internal,
        }
    }
}
