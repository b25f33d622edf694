//! Error types for upload operations

use crate::types::DataType;
use thiserror::Error;

/// Main error type for upload operations
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("data type mismatch: expected {expected}, got {actual}")]
    DtypeMismatch { expected: DataType, actual: DataType },

    #[error("sink write failed: {0}")]
    SinkWrite(String),

    #[error("not a TIFF file: {0}")]
    InvalidExtension(String),

    #[error("invalid volume descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Specialized Result type for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        UploadError::Serialization(err.to_string())
    }
}
