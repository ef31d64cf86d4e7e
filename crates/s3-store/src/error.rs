//! Object store error types

use pipeline::ResourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("Object '{0}' not found")]
    NotFound(String),

    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    #[error("Object store backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV decode error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ObjectStoreError> for ResourceError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound(key) => ResourceError::NotFound { key },
            ObjectStoreError::InvalidKey(key) => ResourceError::InvalidKey { key },
            ObjectStoreError::Csv(_) | ObjectStoreError::Json(_) => {
                ResourceError::Serialization(err.to_string())
            }
            other => ResourceError::Backend(other.to_string()),
        }
    }
}
