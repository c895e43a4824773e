//! Attachment errors

use std::path::PathBuf;

use fv_core::DocumentError;
use fv_storage::{StorageError, ValidationError};
use thiserror::Error;

/// Errors raised by attach, detach and detach-all
///
/// Each pipeline stage maps to its own variant; the backend error that
/// caused it is kept as the source.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("File does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("Key generation failed: {0}")]
    KeyGeneration(#[source] StorageError),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Transformation failed: {0}")]
    Transformation(#[source] StorageError),
    #[error("Backend save failed: {0}")]
    Save(#[source] StorageError),
    #[error("Backend remove failed: {0}")]
    Remove(#[source] StorageError),
    #[error("Persistence failed: {0}")]
    Persistence(#[source] DocumentError),
    #[error("No attachment field bound to path: {0}")]
    BindingNotFound(String),
    #[error("Path does not address an array element: {0}")]
    InvalidIndex(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

impl AttachmentError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AttachmentError::SourceNotFound(_) => "source_not_found",
            AttachmentError::KeyGeneration(_) => "key_generation_failed",
            AttachmentError::Validation(_) => "validation_failed",
            AttachmentError::Transformation(_) => "transformation_failed",
            AttachmentError::Save(_) => "backend_save_failed",
            AttachmentError::Remove(_) => "backend_remove_failed",
            AttachmentError::Persistence(_) => "persistence_failed",
            AttachmentError::BindingNotFound(_) => "binding_not_found",
            AttachmentError::InvalidIndex(_) => "invalid_index",
            AttachmentError::Io(_) => "io_error",
            AttachmentError::Document(_) => "document_error",
        }
    }
}

/// Errors raised while building the field registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Attachment field registered twice: {0}")]
    DuplicateField(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AttachmentError::BindingNotFound("images".into());
        assert_eq!(err.error_code(), "binding_not_found");
        assert_eq!(err.to_string(), "No attachment field bound to path: images");

        let err = AttachmentError::Remove(StorageError::MissingKey);
        assert_eq!(err.error_code(), "backend_remove_failed");
        assert_eq!(err.to_string(), "Backend remove failed: Key is undefined");

        let err = AttachmentError::SourceNotFound(PathBuf::from("/tmp/missing"));
        assert_eq!(err.to_string(), "File does not exist: /tmp/missing");
    }
}
