//! Core error types for fieldvault

use thiserror::Error;

/// Boxed error used at collaborator boundaries (document persistence,
/// transformation stages)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by document accessors and persistence
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Cannot descend into {segment} of {path}: value is not a container")]
    NotContainer { path: String, segment: String },

    #[error("Array index {index} out of bounds at {path}")]
    IndexOutOfBounds { path: String, index: usize },

    #[error("Empty document path")]
    EmptyPath,

    #[error("Persistence failed: {0}")]
    Persistence(#[source] BoxError),
}

impl DocumentError {
    pub fn error_code(&self) -> &'static str {
        match self {
            DocumentError::NotContainer { .. } => "not_container",
            DocumentError::IndexOutOfBounds { .. } => "index_out_of_bounds",
            DocumentError::EmptyPath => "empty_path",
            DocumentError::Persistence(_) => "persistence_failed",
        }
    }
}

/// Standard Result type for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DocumentError::EmptyPath.error_code(), "empty_path");
        let err = DocumentError::Persistence("disk full".into());
        assert_eq!(err.error_code(), "persistence_failed");
        assert!(err.to_string().contains("disk full"));
    }
}
