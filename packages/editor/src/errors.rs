//! Error types for the editor

use arbor_model::{ModelError, NodeId};
use thiserror::Error;

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Dangling reference: node {0} does not exist")]
    DanglingReference(NodeId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Model error: {0}")]
    Model(ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Background work failed: {0}")]
    Background(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl EditorError {
    pub fn invalid(message: impl Into<String>) -> Self {
        EditorError::InvalidOperation(message.into())
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, EditorError::InvalidOperation(_))
    }
}

impl From<ModelError> for EditorError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::DanglingReference(id) => EditorError::DanglingReference(id),
            other => EditorError::Model(other),
        }
    }
}
